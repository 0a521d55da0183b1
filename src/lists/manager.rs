use super::content::{Content, Payload};
use super::list::List;
use crate::constants::*;
use crate::errors::{Error, ProtocolError, ServiceError};
use crate::query::{PathQuery, Queryable};
use crate::transport::{read_to_string, OpenRequest, FORM_CONTENT_TYPE};
use crate::types::ListName;
use crate::Service;
use futures::future::BoxFuture;
use futures::FutureExt;
use itertools::Itertools;
use serde::Deserialize;
use std::collections::{BTreeMap, BTreeSet};
use std::panic::AssertUnwindSafe;

/// Name, description and tags of a list about to be created.
///
/// Without a name, an unused one is generated and the list is temporary:
/// it is deleted by [ListManager::delete_temporary_lists].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ListOptions {
    pub name: Option<String>,
    pub description: Option<String>,
    /// Class of the identified objects. Only used when uploading identifiers.
    pub list_type: String,
    pub tags: Vec<String>,
    /// Extra values which disambiguate identifiers, e.g. organism names.
    pub add: Vec<String>,
}

impl ListOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Identifiers of objects of class `list_type`.
    pub fn of_type(list_type: impl Into<String>) -> Self {
        Self {
            list_type: list_type.into(),
            ..Self::default()
        }
    }

    pub fn name(self, name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..self
        }
    }

    pub fn description(self, description: impl Into<String>) -> Self {
        Self {
            description: Some(description.into()),
            ..self
        }
    }

    pub fn tags<S: Into<String>>(self, tags: impl IntoIterator<Item = S>) -> Self {
        Self {
            tags: tags.into_iter().map(Into::into).collect(),
            ..self
        }
    }

    pub fn add<S: Into<String>>(self, add: impl IntoIterator<Item = S>) -> Self {
        Self {
            add: add.into_iter().map(Into::into).collect(),
            ..self
        }
    }
}

/// Argument of the list operations: an existing list, or a query whose
/// results are first made into a temporary list.
#[derive(Clone, Copy)]
pub enum ListOperand<'q> {
    Name(&'q str),
    Query(&'q dyn Queryable),
}

impl<'q> From<&'q str> for ListOperand<'q> {
    fn from(name: &'q str) -> Self {
        ListOperand::Name(name)
    }
}

impl<'q> From<&'q String> for ListOperand<'q> {
    fn from(name: &'q String) -> Self {
        ListOperand::Name(name)
    }
}

impl<'q> From<&'q ListName> for ListOperand<'q> {
    fn from(name: &'q ListName) -> Self {
        ListOperand::Name(name.as_str())
    }
}

impl<'q> From<&'q List> for ListOperand<'q> {
    fn from(list: &'q List) -> Self {
        ListOperand::Name(list.name.as_str())
    }
}

impl<'q> From<&'q PathQuery> for ListOperand<'q> {
    fn from(query: &'q PathQuery) -> Self {
        ListOperand::Query(query)
    }
}

/// What the list endpoints reply.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListResponse {
    #[serde(default)]
    was_successful: bool,
    #[serde(default)]
    error: Option<String>,
    #[serde(default)]
    list_name: Option<String>,
    #[serde(default)]
    unmatched_identifiers: Option<Vec<String>>,
    #[serde(default)]
    tags: Option<Vec<String>>,
    #[serde(default)]
    lists: Option<Vec<List>>,
}

fn parse_list_response(text: &str) -> Result<ListResponse, Error> {
    let response: ListResponse =
        serde_json::from_str(text).map_err(|source| ProtocolError::BadEnvelope {
            text: text.to_string(),
            source,
        })?;
    if response.was_successful {
        Ok(response)
    } else {
        let message = response
            .error
            .unwrap_or_else(|| "no reason given".to_string());
        Err(ServiceError::ListService(message).into())
    }
}

fn encode(params: &[(&str, String)]) -> Result<String, Error> {
    serde_urlencoded::to_string(params)
        .map_err(|e| ServiceError::InvalidArgument(e.to_string()).into())
}

/// Lists of one mine, and the temporary lists made through this manager.
///
/// The lists are fetched on first use and refetched after every change.
/// Temporary lists should be deleted when they are no longer needed, either
/// with [ListManager::delete_temporary_lists] or by working inside
/// [ListManager::scoped].
pub struct ListManager<'s> {
    service: &'s Service,
    lists: Option<BTreeMap<String, List>>,
    temporary: BTreeSet<String>,
}

impl<'s> ListManager<'s> {
    pub(crate) fn new(service: &'s Service) -> Self {
        Self {
            service,
            lists: None,
            temporary: BTreeSet::new(),
        }
    }

    pub fn service(&self) -> &'s Service {
        self.service
    }

    async fn call(&self, request: OpenRequest) -> Result<ListResponse, Error> {
        let body = self.service.opener().send(request.accept_json()).await?;
        let text = read_to_string(body).await?;
        parse_list_response(&text)
    }

    fn url(&self, path: &str, params: &[(&str, String)]) -> Result<String, Error> {
        Ok(format!("{}?{}", self.service.url(path), encode(params)?))
    }

    /// Fetch the lists available to the current user.
    pub async fn refresh_lists(&mut self) -> Result<(), Error> {
        let response = self
            .call(OpenRequest::get(self.service.url(LIST_PATH)))
            .await?;
        let lists = response.lists.ok_or_else(|| ServiceError::MissingKey {
            key: "lists",
            path: LIST_PATH.to_string(),
        })?;
        log::debug!("{} lists available", lists.len());
        self.lists = Some(
            lists
                .into_iter()
                .map(|list| (list.name.to_string(), list))
                .collect(),
        );
        Ok(())
    }

    async fn loaded(&mut self) -> Result<&mut BTreeMap<String, List>, Error> {
        if self.lists.is_none() {
            self.refresh_lists().await?;
        }
        Ok(self.lists.get_or_insert_with(BTreeMap::new))
    }

    pub async fn get_list(&mut self, name: &str) -> Result<Option<&List>, Error> {
        Ok(self.loaded().await?.get(name))
    }

    /// All lists, ordered by name.
    pub async fn get_all_lists(&mut self) -> Result<impl Iterator<Item = &List>, Error> {
        Ok(self.loaded().await?.values())
    }

    pub async fn get_all_list_names(&mut self) -> Result<impl Iterator<Item = &str>, Error> {
        Ok(self.loaded().await?.keys().map(String::as_str))
    }

    pub async fn get_list_count(&mut self) -> Result<usize, Error> {
        Ok(self.loaded().await?.len())
    }

    /// Names of the temporary lists which have not been deleted yet.
    pub fn temporary_lists(&self) -> impl Iterator<Item = &str> {
        self.temporary.iter().map(String::as_str)
    }

    /// A name which no list on the server has.
    pub async fn get_unused_list_name(&mut self) -> Result<String, Error> {
        self.refresh_lists().await?;
        let prefix = &self.service.list_settings().default_list_name;
        let lists = self.lists.as_ref();
        let mut n = 1;
        loop {
            let name = format!("{}_{}", prefix, n);
            if !lists.map_or(false, |lists| lists.contains_key(&name)) {
                return Ok(name);
            }
            n += 1;
        }
    }

    /// The requested name, or an unused one if the new list is temporary.
    async fn new_list_name(&mut self, name: Option<String>) -> Result<(String, bool), Error> {
        match name {
            Some(name) => Ok((name, false)),
            None => Ok((self.get_unused_list_name().await?, true)),
        }
    }

    /// Record a list made under a generated name, once the server has it.
    fn track(&mut self, list: List, temporary: bool) -> List {
        if temporary {
            self.temporary.insert(list.name.to_string());
        }
        list
    }

    /// Create a list from identifiers or from the results of a query.
    pub async fn create_list(
        &mut self,
        content: impl Into<Content>,
        options: ListOptions,
    ) -> Result<List, Error> {
        let (name, temporary) = self.new_list_name(options.name).await?;
        let description = options
            .description
            .unwrap_or_else(|| self.service.list_settings().default_description.clone());
        let tags = options.tags.join(";");
        let text = match content.into().into_payload().await? {
            Payload::Query(query) => {
                let mut params = query.listable().to_query_params();
                params.push(("listName".to_string(), name.clone()));
                params.push(("description".to_string(), description));
                params.push(("tags".to_string(), tags));
                let form = serde_urlencoded::to_string(&params)
                    .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
                let url = self.service.url(QUERY_LIST_UPLOAD_PATH);
                log::debug!("creating list {} from a query", name);
                self.service.opener().read(&url, Some(form)).await?
            }
            Payload::Text(identifiers) => {
                let mut params = vec![
                    ("name", name.clone()),
                    ("type", options.list_type),
                    ("description", description),
                    ("tags", tags),
                ];
                params.extend(options.add.iter().map(|a| ("add", a.to_lowercase())));
                let url = self.url(LIST_PATH, &params)?;
                log::debug!("creating list {} from identifiers", name);
                self.service
                    .opener()
                    .post_plain_text(&url, identifiers)
                    .await?
            }
        };
        let list = self.parse_list_upload_response(&text).await?;
        Ok(self.track(list, temporary))
    }

    /// Check the reply to an upload and return the up-to-date list it names.
    pub async fn parse_list_upload_response(&mut self, text: &str) -> Result<List, Error> {
        let response = parse_list_response(text)?;
        let name = response.list_name.ok_or_else(|| ServiceError::MissingKey {
            key: "listName",
            path: LIST_PATH.to_string(),
        })?;
        self.refresh_lists().await?;
        let list = self
            .lists
            .as_mut()
            .and_then(|lists| lists.get_mut(&name))
            .ok_or_else(|| {
                ServiceError::ListService(format!("{} is not among the available lists", name))
            })?;
        list.unmatched_identifiers
            .extend(response.unmatched_identifiers.into_iter().flatten());
        Ok(list.clone())
    }

    /// Delete lists by name. Names of lists which do not exist are skipped.
    pub async fn delete_lists<S: AsRef<str>>(
        &mut self,
        names: impl IntoIterator<Item = S>,
    ) -> Result<(), Error> {
        self.refresh_lists().await?;
        let existing: Vec<String> = {
            let lists = self.lists.as_ref();
            names
                .into_iter()
                .filter_map(|name| {
                    let name = name.as_ref();
                    if lists.map_or(false, |l| l.contains_key(name)) {
                        Some(name.to_string())
                    } else {
                        log::debug!("{} does not exist - skipping", name);
                        None
                    }
                })
                .collect()
        };
        for name in existing {
            log::debug!("deleting list {}", name);
            let url = self.url(LIST_PATH, &[("name", name)])?;
            self.call(OpenRequest::delete(url)).await?;
        }
        self.refresh_lists().await
    }

    /// Delete every temporary list made through this manager.
    pub async fn delete_temporary_lists(&mut self) -> Result<(), Error> {
        if self.temporary.is_empty() {
            return Ok(());
        }
        let names: Vec<String> = self.temporary.iter().cloned().collect();
        self.delete_lists(&names).await?;
        self.temporary.clear();
        Ok(())
    }

    /// Run `f`, then delete the temporary lists it made, even if it fails or
    /// panics. Lists `f` wants to keep should be renamed.
    ///
    /// ```no_run
    /// # async fn example(service: &intermine::Service) -> Result<(), intermine::Error> {
    /// use futures::FutureExt;
    /// use intermine::ListOptions;
    ///
    /// let mut manager = service.list_manager();
    /// let size = manager
    ///     .scoped(|m| {
    ///         async move {
    ///             let list = m.create_list("eve zen", ListOptions::of_type("Gene")).await?;
    ///             Ok::<_, intermine::Error>(list.size)
    ///         }
    ///         .boxed()
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn scoped<T, E, F>(&mut self, f: F) -> Result<T, E>
    where
        F: for<'m> FnOnce(&'m mut ListManager<'s>) -> BoxFuture<'m, Result<T, E>>,
        E: From<Error>,
    {
        let outcome = AssertUnwindSafe(f(&mut *self)).catch_unwind().await;
        let cleanup = self.delete_temporary_lists().await;
        match outcome {
            Ok(Ok(value)) => {
                cleanup?;
                Ok(value)
            }
            Ok(Err(e)) => {
                if let Err(c) = cleanup {
                    log::warn!("could not delete temporary lists: {}", c);
                }
                Err(e)
            }
            Err(panic) => {
                if let Err(c) = cleanup {
                    log::warn!("could not delete temporary lists: {}", c);
                }
                std::panic::resume_unwind(panic)
            }
        }
    }

    async fn make_list_names<'q>(
        &mut self,
        operands: impl IntoIterator<Item = ListOperand<'q>>,
    ) -> Result<Vec<String>, Error> {
        let mut names = Vec::new();
        for operand in operands {
            match operand {
                ListOperand::Name(name) => names.push(name.to_string()),
                ListOperand::Query(query) => {
                    let content = Content::query(query);
                    let list = self.create_list(content, ListOptions::default()).await?;
                    names.push(list.name.to_string());
                }
            }
        }
        Ok(names)
    }

    async fn do_operation<'q>(
        &mut self,
        path: &str,
        operation: &str,
        operands: impl IntoIterator<Item = ListOperand<'q>>,
        options: ListOptions,
    ) -> Result<List, Error> {
        let names = self.make_list_names(operands).await?;
        let (name, temporary) = self.new_list_name(options.name).await?;
        let description = options
            .description
            .unwrap_or_else(|| format!("{} of {}", operation, names.join(" and ")));
        let params = [
            ("name", name),
            ("lists", names.join(";")),
            ("description", description),
            ("tags", options.tags.join(";")),
        ];
        let url = self.url(path, &params)?;
        let text = self.service.opener().read(&url, None).await?;
        let list = self.parse_list_upload_response(&text).await?;
        Ok(self.track(list, temporary))
    }

    /// A new list of the objects in all of `lists`.
    pub async fn intersect<'q, O: Into<ListOperand<'q>>>(
        &mut self,
        lists: impl IntoIterator<Item = O>,
        options: ListOptions,
    ) -> Result<List, Error> {
        let operands = lists.into_iter().map(Into::into);
        self.do_operation(INTERSECTION_PATH, "Intersection", operands, options)
            .await
    }

    /// A new list of the objects in any of `lists`.
    pub async fn union<'q, O: Into<ListOperand<'q>>>(
        &mut self,
        lists: impl IntoIterator<Item = O>,
        options: ListOptions,
    ) -> Result<List, Error> {
        let operands = lists.into_iter().map(Into::into);
        self.do_operation(UNION_PATH, "Union", operands, options)
            .await
    }

    /// A new list of the objects in exactly one of `lists`.
    pub async fn xor<'q, O: Into<ListOperand<'q>>>(
        &mut self,
        lists: impl IntoIterator<Item = O>,
        options: ListOptions,
    ) -> Result<List, Error> {
        let operands = lists.into_iter().map(Into::into);
        self.do_operation(DIFFERENCE_PATH, "Difference", operands, options)
            .await
    }

    /// A new list of the objects in any of `lefts` and in none of `rights`.
    pub async fn subtract<'q, L, R>(
        &mut self,
        lefts: impl IntoIterator<Item = L>,
        rights: impl IntoIterator<Item = R>,
        options: ListOptions,
    ) -> Result<List, Error>
    where
        L: Into<ListOperand<'q>>,
        R: Into<ListOperand<'q>>,
    {
        let left_names = self
            .make_list_names(lefts.into_iter().map(Into::into))
            .await?;
        let right_names = self
            .make_list_names(rights.into_iter().map(Into::into))
            .await?;
        let (name, temporary) = self.new_list_name(options.name).await?;
        let description = options.description.unwrap_or_else(|| {
            format!(
                "Subtraction of {} from {}",
                right_names.join(" and "),
                left_names.join(" and ")
            )
        });
        let params = [
            ("name", name),
            ("description", description),
            ("references", left_names.join(";")),
            ("subtract", right_names.join(";")),
            ("tags", options.tags.join(";")),
        ];
        let url = self.url(SUBTRACTION_PATH, &params)?;
        let text = self.service.opener().read(&url, None).await?;
        let list = self.parse_list_upload_response(&text).await?;
        Ok(self.track(list, temporary))
    }

    fn update_tags(&mut self, name: &str, response: ListResponse) -> Result<BTreeSet<String>, Error> {
        let tags: BTreeSet<String> = response
            .tags
            .ok_or_else(|| ServiceError::MissingKey {
                key: "tags",
                path: LIST_TAG_PATH.to_string(),
            })?
            .into_iter()
            .collect();
        if let Some(list) = self.lists.as_mut().and_then(|lists| lists.get_mut(name)) {
            list.tags = tags.clone();
        }
        Ok(tags)
    }

    /// Tag a list, returning all of its tags.
    pub async fn add_tags<S: AsRef<str>>(
        &mut self,
        name: &str,
        tags: impl IntoIterator<Item = S>,
    ) -> Result<BTreeSet<String>, Error> {
        let tags = tags.into_iter().map(|t| t.as_ref().to_string()).join(";");
        let form = encode(&[("name", name.to_string()), ("tags", tags)])?;
        let request = OpenRequest::post(self.service.url(LIST_TAG_PATH), form, FORM_CONTENT_TYPE);
        let response = self.call(request).await?;
        self.update_tags(name, response)
    }

    /// Untag a list, returning its remaining tags.
    pub async fn remove_tags<S: AsRef<str>>(
        &mut self,
        name: &str,
        tags: impl IntoIterator<Item = S>,
    ) -> Result<BTreeSet<String>, Error> {
        let tags = tags.into_iter().map(|t| t.as_ref().to_string()).join(";");
        let url = self.url(LIST_TAG_PATH, &[("name", name.to_string()), ("tags", tags)])?;
        let response = self.call(OpenRequest::delete(url)).await?;
        self.update_tags(name, response)
    }

    /// The current tags of a list, according to the server.
    pub async fn get_tags(&mut self, name: &str) -> Result<BTreeSet<String>, Error> {
        let url = self.url(LIST_TAG_PATH, &[("name", name.to_string())])?;
        let response = self.call(OpenRequest::get(url)).await?;
        self.update_tags(name, response)
    }

    /// Rename a list. A renamed temporary list is kept.
    pub async fn rename_list(&mut self, old_name: &str, new_name: &str) -> Result<List, Error> {
        let params = [
            ("oldname", old_name.to_string()),
            ("newname", new_name.to_string()),
        ];
        let url = self.url(LIST_RENAME_PATH, &params)?;
        let text = self.service.opener().read(&url, None).await?;
        let list = self.parse_list_upload_response(&text).await?;
        self.temporary.remove(old_name);
        Ok(list)
    }

    /// Add the objects of `content` to an existing list.
    pub async fn append_to_list(
        &mut self,
        name: &str,
        content: impl Into<Content>,
    ) -> Result<List, Error> {
        let text = match content.into().into_payload().await? {
            Payload::Query(query) => {
                let mut params = query.listable().to_query_params();
                params.push(("listName".to_string(), name.to_string()));
                let form = serde_urlencoded::to_string(&params)
                    .map_err(|e| ServiceError::InvalidArgument(e.to_string()))?;
                let url = self.service.url(QUERY_LIST_APPEND_PATH);
                self.service.opener().read(&url, Some(form)).await?
            }
            Payload::Text(identifiers) => {
                let url = self.url(LIST_APPENDING_PATH, &[("name", name.to_string())])?;
                self.service
                    .opener()
                    .post_plain_text(&url, identifiers)
                    .await?
            }
        };
        log::debug!("appended to list {}", name);
        self.parse_list_upload_response(&text).await
    }
}

impl Drop for ListManager<'_> {
    fn drop(&mut self) {
        if !self.temporary.is_empty() {
            log::warn!(
                "temporary lists were not deleted: {}",
                self.temporary.iter().join(", ")
            );
        }
    }
}
