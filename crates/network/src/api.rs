// crates/network/src/api.rs
//! Remote content API

use crate::client::Client;
use crate::error::{NetworkError, NetworkResult};
use async_trait::async_trait;
use bookplayer_core::{BookmarkParams, ItemMetadata, MetadataUpdate, MoveParams, RelativePath};
use bytes::Bytes;
use reqwest::{Method, Response, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// Remote view of one library level
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentListing {
    #[serde(default)]
    pub items: Vec<ItemMetadata>,
    /// Remote's record of the last played item, if any
    #[serde(default)]
    pub last_played: Option<ItemMetadata>,
}

/// Signed download location of one remote file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub relative_path: RelativePath,
    pub url: String,
    /// Size in bytes when the server reports it
    #[serde(default)]
    pub size: Option<u64>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ArtworkResponse {
    thumbnail_url: String,
}

#[derive(Deserialize)]
struct FileUrlsResponse {
    files: Vec<RemoteFile>,
}

/// Calls the sync engine issues against the remote library
///
/// Every mutating call's effect depends only on its arguments, so repeating
/// a call whose response was lost is safe.
#[async_trait]
pub trait RemoteApi: Send + Sync {
    /// `GET /contents?path=`; `None` lists the library root
    async fn list_contents(&self, path: Option<&RelativePath>) -> NetworkResult<ContentListing>;

    /// `POST /items/{path}` with the full metadata snapshot
    async fn upload_item(&self, item: &ItemMetadata) -> NetworkResult<()>;

    /// `PATCH /items/{path}`
    async fn update_item(&self, path: &RelativePath, update: &MetadataUpdate) -> NetworkResult<()>;

    /// `PATCH /items/{origin}/move`
    async fn move_item(&self, origin: &RelativePath, destination: &RelativePath)
        -> NetworkResult<()>;

    /// `DELETE /items/{path}?shallow=`
    async fn delete_item(&self, path: &RelativePath, shallow: bool) -> NetworkResult<()>;

    /// `POST /items/{path}/bookmarks`
    async fn set_bookmark(&self, path: &RelativePath, bookmark: &BookmarkParams)
        -> NetworkResult<()>;

    /// `DELETE /items/{path}/bookmarks/{time}`
    async fn delete_bookmark(&self, path: &RelativePath, time: f64) -> NetworkResult<()>;

    /// `POST /items/{path}/artwork`; returns the thumbnail URL
    async fn upload_artwork(&self, path: &RelativePath, image: Bytes) -> NetworkResult<String>;

    /// `GET /items/{path}/file-url`
    async fn remote_files(&self, path: &RelativePath) -> NetworkResult<Vec<RemoteFile>>;
}

/// [`RemoteApi`] over HTTP/JSON
#[derive(Clone)]
pub struct HttpRemoteApi {
    client: Client,
    base_url: Url,
}

impl HttpRemoteApi {
    /// Creates an API bound to `base_url` (e.g. `https://api.example.com/v1`)
    pub fn new(client: Client, base_url: &str) -> NetworkResult<Self> {
        let base_url =
            Url::parse(base_url).map_err(|e| NetworkError::InvalidUrl(e.to_string()))?;
        if base_url.cannot_be_a_base() {
            return Err(NetworkError::InvalidUrl(base_url.to_string()));
        }
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, segments: &[&str]) -> NetworkResult<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| NetworkError::InvalidUrl(self.base_url.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// The whole relative path is sent as one percent-encoded segment
    pub(crate) fn item_url(&self, path: &RelativePath, suffix: &[&str]) -> NetworkResult<Url> {
        let mut segments = vec!["items", path.as_str()];
        segments.extend_from_slice(suffix);
        self.endpoint(&segments)
    }

    async fn json<T: DeserializeOwned>(response: Response) -> NetworkResult<T> {
        response
            .json::<T>()
            .await
            .map_err(|e| NetworkError::Decode(e.to_string()))
    }
}

#[async_trait]
impl RemoteApi for HttpRemoteApi {
    async fn list_contents(&self, path: Option<&RelativePath>) -> NetworkResult<ContentListing> {
        let mut url = self.endpoint(&["contents"])?;
        if let Some(path) = path {
            url.query_pairs_mut().append_pair("path", path.as_str());
        }
        let response = self
            .client
            .send(|| self.client.request(Method::GET, url.clone()))
            .await?;
        Self::json(response).await
    }

    async fn upload_item(&self, item: &ItemMetadata) -> NetworkResult<()> {
        let url = self.item_url(&item.relative_path, &[])?;
        self.client
            .send(|| self.client.request(Method::POST, url.clone()).json(item))
            .await?;
        Ok(())
    }

    async fn update_item(&self, path: &RelativePath, update: &MetadataUpdate) -> NetworkResult<()> {
        let url = self.item_url(path, &[])?;
        self.client
            .send(|| self.client.request(Method::PATCH, url.clone()).json(update))
            .await?;
        Ok(())
    }

    async fn move_item(
        &self,
        origin: &RelativePath,
        destination: &RelativePath,
    ) -> NetworkResult<()> {
        let url = self.item_url(origin, &["move"])?;
        let body = MoveParams {
            origin: origin.clone(),
            destination: destination.clone(),
        };
        self.client
            .send(|| self.client.request(Method::PATCH, url.clone()).json(&body))
            .await?;
        Ok(())
    }

    async fn delete_item(&self, path: &RelativePath, shallow: bool) -> NetworkResult<()> {
        let mut url = self.item_url(path, &[])?;
        url.query_pairs_mut()
            .append_pair("shallow", if shallow { "true" } else { "false" });
        self.client
            .send(|| self.client.request(Method::DELETE, url.clone()))
            .await?;
        Ok(())
    }

    async fn set_bookmark(
        &self,
        path: &RelativePath,
        bookmark: &BookmarkParams,
    ) -> NetworkResult<()> {
        let url = self.item_url(path, &["bookmarks"])?;
        self.client
            .send(|| self.client.request(Method::POST, url.clone()).json(bookmark))
            .await?;
        Ok(())
    }

    async fn delete_bookmark(&self, path: &RelativePath, time: f64) -> NetworkResult<()> {
        let time = time.to_string();
        let url = self.item_url(path, &["bookmarks", &time])?;
        self.client
            .send(|| self.client.request(Method::DELETE, url.clone()))
            .await?;
        Ok(())
    }

    async fn upload_artwork(&self, path: &RelativePath, image: Bytes) -> NetworkResult<String> {
        let url = self.item_url(path, &["artwork"])?;
        let response = self
            .client
            .send(|| {
                self.client
                    .request(Method::POST, url.clone())
                    .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
                    .body(image.clone())
            })
            .await?;
        let body: ArtworkResponse = Self::json(response).await?;
        Ok(body.thumbnail_url)
    }

    async fn remote_files(&self, path: &RelativePath) -> NetworkResult<Vec<RemoteFile>> {
        let url = self.item_url(path, &["file-url"])?;
        let response = self
            .client
            .send(|| self.client.request(Method::GET, url.clone()))
            .await?;
        let body: FileUrlsResponse = Self::json(response).await?;
        Ok(body.files)
    }
}
