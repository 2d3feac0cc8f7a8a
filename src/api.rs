use crate::constants::*;
use crate::data_structures::*;
use crate::errors::{AppError, AppResult};
use crate::logging::{log, LogLevel};
use async_recursion::async_recursion;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderValue, AUTHORIZATION, COOKIE};
use reqwest::Client;
use scraper::{Html, Selector};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::time::sleep;

const LIST_OPTIONS_QUERY: &str = r#"
query ($userName: String) {
  User(name: $userName) {
    mediaListOptions {
      scoreFormat
      animeList { customLists advancedScoring advancedScoringEnabled }
      mangaList { customLists advancedScoring advancedScoringEnabled }
    }
  }
}"#;

const LOOKUP_QUERY: &str = r#"
query ($userName: String, $mediaIds: [Int], $perPage: Int) {
  Page(page: 1, perPage: $perPage) {
    mediaList(userName: $userName, mediaId_in: $mediaIds, compareWithAuthList: true) {
      id
      mediaId
      customLists
      advancedScores
      media { isFavourite title { userPreferred } coverImage { medium } }
    }
  }
}"#;

const SAVE_ENTRY_MUTATION: &str = r#"
mutation (
  $id: Int, $status: MediaListStatus, $score: Float, $progress: Int, $progressVolumes: Int,
  $repeat: Int, $private: Boolean, $notes: String, $hiddenFromStatusLists: Boolean,
  $customLists: [String], $advancedScores: [Float], $startedAt: FuzzyDateInput,
  $completedAt: FuzzyDateInput
) {
  SaveMediaListEntry(
    id: $id, status: $status, score: $score, progress: $progress,
    progressVolumes: $progressVolumes, repeat: $repeat, private: $private, notes: $notes,
    hiddenFromStatusLists: $hiddenFromStatusLists, customLists: $customLists,
    advancedScores: $advancedScores, startedAt: $startedAt, completedAt: $completedAt
  ) { id }
}"#;

const BATCH_UPDATE_MUTATION: &str = r#"
mutation (
  $ids: [Int], $status: MediaListStatus, $score: Float, $progress: Int, $progressVolumes: Int,
  $repeat: Int, $private: Boolean, $notes: String, $hiddenFromStatusLists: Boolean,
  $advancedScores: [Float], $startedAt: FuzzyDateInput, $completedAt: FuzzyDateInput
) {
  UpdateMediaListEntries(
    ids: $ids, status: $status, score: $score, progress: $progress,
    progressVolumes: $progressVolumes, repeat: $repeat, private: $private, notes: $notes,
    hiddenFromStatusLists: $hiddenFromStatusLists, advancedScores: $advancedScores,
    startedAt: $startedAt, completedAt: $completedAt
  ) { id }
}"#;

const DELETE_MUTATION: &str = r#"
mutation ($id: Int) {
  DeleteMediaListEntry(id: $id) { deleted }
}"#;

const TOGGLE_ANIME_FAVOURITE: &str = r#"
mutation ($animeId: Int) {
  ToggleFavourite(animeId: $animeId) { anime { pageInfo { total } } }
}"#;

const TOGGLE_MANGA_FAVOURITE: &str = r#"
mutation ($mangaId: Int) {
  ToggleFavourite(mangaId: $mangaId) { manga { pageInfo { total } } }
}"#;

/// Everything the batch editor needs from AniList.
#[async_trait]
pub trait ListApi: Send + Sync {
    async fn list_options(&self, user_name: &str, kind: ListKind) -> AppResult<ListOptions>;

    /// One page of lookups; callers keep `media_ids` within `LOOKUP_PAGE_SIZE`.
    async fn lookup_entries(
        &self,
        user_name: &str,
        media_ids: &[MediaId],
    ) -> AppResult<Vec<EntryState>>;

    async fn update_entry(&self, entry_id: EntryId, values: &UpdateValues) -> AppResult<()>;

    async fn batch_update(&self, entry_ids: &[EntryId], values: &UpdateValues) -> AppResult<()>;

    async fn delete_entry(&self, entry_id: EntryId) -> AppResult<()>;

    /// There is no "set favourite" mutation, only a toggle.
    async fn toggle_favourite(&self, kind: ListKind, media_id: MediaId) -> AppResult<()>;
}

#[derive(Clone, Debug)]
pub enum Credentials {
    Bearer(String),
    Csrf { token: String, cookie: Option<String> },
}

/// Pulls `window.al_token` out of a saved AniList page.
pub fn scrape_csrf_token(html: &str) -> AppResult<String> {
    let document = Html::parse_document(html);
    let selector = Selector::parse("head script")
        .map_err(|e| AppError::Unexpected(format!("Bad selector: {:?}", e)))?;
    document
        .select(&selector)
        .filter_map(|script| {
            let text: String = script.text().collect();
            CSRF_TOKEN_RE
                .captures(&text)
                .map(|caps| caps[1].to_string())
        })
        .next()
        .ok_or(AppError::MissingToken)
}

fn merge_variables(mut base: Value, values: &UpdateValues) -> AppResult<Value> {
    if let (Value::Object(target), Value::Object(extra)) = (&mut base, serde_json::to_value(values)?)
    {
        target.extend(extra);
    }
    Ok(base)
}

fn error_messages(body: &[u8]) -> Vec<String> {
    let mut buf = body.to_vec();
    match simd_json::from_slice::<GraphQlResponse>(&mut buf) {
        Ok(resp) if !resp.errors.is_empty() => {
            resp.errors.into_iter().map(|e| e.message).collect()
        }
        _ => vec![String::from_utf8_lossy(body).chars().take(200).collect()],
    }
}

#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    endpoint: String,
    credentials: Credentials,
    backoff: Duration,
}

impl ApiClient {
    pub fn new(credentials: Credentials) -> AppResult<Self> {
        let endpoint = match &credentials {
            Credentials::Bearer(_) => GRAPHQL_URL.to_string(),
            Credentials::Csrf { .. } => format!("{}/graphql", SITE_URL),
        };
        Self::with_endpoint(endpoint, credentials)
    }

    pub fn with_endpoint(endpoint: impl Into<String>, credentials: Credentials) -> AppResult<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(HTTP_TIMEOUT_SECONDS))
            .connect_timeout(Duration::from_secs(HTTP_CONNECT_TIMEOUT))
            .build()?;
        Ok(ApiClient {
            client,
            endpoint: endpoint.into(),
            credentials,
            backoff: Duration::from_secs_f32(RETRY_BACKOFF_SECONDS),
        })
    }

    pub fn with_backoff(mut self, backoff: Duration) -> Self {
        self.backoff = backoff;
        self
    }

    fn headers(&self) -> AppResult<reqwest::header::HeaderMap> {
        let mut headers = BASE_HEADERS.clone();
        let invalid = |_: reqwest::header::InvalidHeaderValue| {
            AppError::Argument("Token contains invalid header characters".into())
        };
        match &self.credentials {
            Credentials::Bearer(token) => {
                headers.insert(
                    AUTHORIZATION,
                    HeaderValue::from_str(&format!("Bearer {}", token)).map_err(invalid)?,
                );
            }
            Credentials::Csrf { token, cookie } => {
                headers.insert("x-csrf-token", HeaderValue::from_str(token).map_err(invalid)?);
                if let Some(cookie) = cookie {
                    headers.insert(COOKIE, HeaderValue::from_str(cookie).map_err(invalid)?);
                }
            }
        }
        Ok(headers)
    }

    /// Queries are retried on transient failures; mutations never are.
    #[async_recursion]
    async fn post_internal(
        &self,
        op_name: &str,
        body: &Value,
        retryable: bool,
        attempt: u32,
    ) -> AppResult<Bytes> {
        let log_prefix = format!("GraphQL {}", op_name);
        let can_retry = retryable && attempt < MAX_QUERY_RETRIES;
        tracing::debug!(op = op_name, attempt, "POST {}", self.endpoint);
        let request = self
            .client
            .post(&self.endpoint)
            .headers(self.headers()?)
            .json(body);

        match request.send().await {
            Ok(resp) => {
                let status = resp.status();
                let bytes = resp.bytes().await?;
                if status.is_success() {
                    return Ok(bytes);
                }
                let transient = status.as_u16() == 429 || status.is_server_error();
                if can_retry && transient {
                    log(
                        LogLevel::Warning,
                        &format!(
                            "{} - HTTP {} (Try {}/{})",
                            log_prefix,
                            status,
                            attempt + 1,
                            MAX_QUERY_RETRIES + 1
                        ),
                    );
                    sleep(self.backoff * (attempt + 1)).await;
                    return self.post_internal(op_name, body, retryable, attempt + 1).await;
                }
                Err(AppError::GraphQl {
                    status: status.as_u16(),
                    messages: error_messages(&bytes),
                })
            }

            Err(e) => {
                if can_retry && (e.is_timeout() || e.is_connect()) {
                    log(
                        LogLevel::Warning,
                        &format!(
                            "{} - {} error (Try {}/{})",
                            log_prefix,
                            if e.is_timeout() { "Timeout" } else { "Connection" },
                            attempt + 1,
                            MAX_QUERY_RETRIES + 1
                        ),
                    );
                    sleep(self.backoff * (attempt + 1)).await;
                    return self.post_internal(op_name, body, retryable, attempt + 1).await;
                }
                if e.is_timeout() {
                    Err(AppError::Timeout)
                } else {
                    Err(AppError::Reqwest(e))
                }
            }
        }
    }

    async fn request<T: DeserializeOwned>(
        &self,
        op_name: &str,
        query: &str,
        variables: Value,
        retryable: bool,
    ) -> AppResult<T> {
        let body = serde_json::to_value(GraphQlRequest { query, variables })?;
        let mut bytes_vec = self
            .post_internal(op_name, &body, retryable, 0)
            .await?
            .to_vec();
        let wrapper: GraphQlResponse = simd_json::from_slice(&mut bytes_vec)?;
        if !wrapper.errors.is_empty() {
            return Err(AppError::GraphQl {
                status: 200,
                messages: wrapper.errors.into_iter().map(|e| e.message).collect(),
            });
        }
        let data = wrapper
            .data
            .ok_or_else(|| AppError::ApiResponseInvalid(format!("Missing 'data' for {}", op_name)))?;
        serde_json::from_value(data)
            .map_err(|e| AppError::ApiResponseInvalid(format!("{}: {}", op_name, e)))
    }
}

#[async_trait]
impl ListApi for ApiClient {
    async fn list_options(&self, user_name: &str, kind: ListKind) -> AppResult<ListOptions> {
        let data: UserOptionsData = self
            .request(
                "ListOptions",
                LIST_OPTIONS_QUERY,
                json!({ "userName": user_name }),
                true,
            )
            .await?;
        let options = data
            .user
            .and_then(|u| u.media_list_options)
            .ok_or_else(|| {
                AppError::ApiResponseInvalid(format!("No list options for user {}", user_name))
            })?;
        Ok(options.into_list_options(kind))
    }

    async fn lookup_entries(
        &self,
        user_name: &str,
        media_ids: &[MediaId],
    ) -> AppResult<Vec<EntryState>> {
        if media_ids.is_empty() {
            return Ok(Vec::new());
        }
        let data: LookupData = self
            .request(
                "Lookup",
                LOOKUP_QUERY,
                json!({
                    "userName": user_name,
                    "mediaIds": media_ids,
                    "perPage": LOOKUP_PAGE_SIZE,
                }),
                true,
            )
            .await?;
        Ok(data.page.media_list.into_iter().map(EntryState::from).collect())
    }

    async fn update_entry(&self, entry_id: EntryId, values: &UpdateValues) -> AppResult<()> {
        let variables = merge_variables(json!({ "id": entry_id }), values)?;
        let _: Value = self
            .request("SaveMediaListEntry", SAVE_ENTRY_MUTATION, variables, false)
            .await?;
        Ok(())
    }

    async fn batch_update(&self, entry_ids: &[EntryId], values: &UpdateValues) -> AppResult<()> {
        // The multi-entry mutation has no customLists argument.
        if values.custom_lists.is_some() {
            tracing::debug!(count = entry_ids.len(), "batch with custom lists, saving one by one");
            for id in entry_ids {
                self.update_entry(*id, values).await?;
            }
            return Ok(());
        }
        let variables = merge_variables(json!({ "ids": entry_ids }), values)?;
        let _: Value = self
            .request("UpdateMediaListEntries", BATCH_UPDATE_MUTATION, variables, false)
            .await?;
        Ok(())
    }

    async fn delete_entry(&self, entry_id: EntryId) -> AppResult<()> {
        let data: DeleteData = self
            .request(
                "DeleteMediaListEntry",
                DELETE_MUTATION,
                json!({ "id": entry_id }),
                false,
            )
            .await?;
        match data.delete {
            Some(DeletedPayload { deleted: true }) => Ok(()),
            _ => Err(AppError::ApiResponseInvalid(format!(
                "The deletion request returned no errors but entry {} was not deleted",
                entry_id
            ))),
        }
    }

    async fn toggle_favourite(&self, kind: ListKind, media_id: MediaId) -> AppResult<()> {
        let (query, variables) = match kind {
            ListKind::Anime => (TOGGLE_ANIME_FAVOURITE, json!({ "animeId": media_id })),
            ListKind::Manga => (TOGGLE_MANGA_FAVOURITE, json!({ "mangaId": media_id })),
        };
        let _: Value = self
            .request("ToggleFavourite", query, variables, false)
            .await?;
        Ok(())
    }
}
