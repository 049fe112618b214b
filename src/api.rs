//! Remote content API: traits consumed by the engine and a MediaWiki client

use crate::config::FeedConfig;
use crate::error::{FeedError, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;

/// Media titles per `imageinfo` request accepted by the API
const MEDIA_INFO_CHUNK: usize = 50;
/// Width of the rendition fetched for preloading; ranking still uses the original size
const SCALED_MEDIA_WIDTH: &str = "1280";

const RASTER_EXTENSIONS: [&str; 5] = [".jpg", ".jpeg", ".png", ".gif", ".webp"];

/// Raw item payload, validated later by `FeedItem::from_api`
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct ApiItem {
    pub pageid: Option<u64>,
    pub title: Option<String>,
    pub extract: Option<String>,
    pub thumbnail: Option<ApiThumbnail>,
    pub fullurl: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ApiThumbnail {
    pub source: String,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

/// Resolved media candidate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaInfo {
    pub title: String,
    pub url: String,
    pub width: u32,
    pub height: u32,
}

impl MediaInfo {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

/// Item and media lookups, all parameterized by locale
#[async_trait]
pub trait ContentApi: Send + Sync {
    /// One random item with optional thumbnail
    async fn random_item(&self, locale: &str) -> Result<ApiItem>;

    /// Displayable media titles attached to the item
    async fn item_media(&self, locale: &str, item_title: &str) -> Result<Vec<String>>;

    /// URL and dimensions for the given media titles
    async fn media_info(&self, locale: &str, media_titles: &[String]) -> Result<Vec<MediaInfo>>;
}

/// Raw image bytes for preloading
#[async_trait]
pub trait ImageFetcher: Send + Sync {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>>;
}

/// Keeps common raster formats and drops icon/logo style files
pub fn is_displayable_media_title(title: &str) -> bool {
    let lower = title.to_lowercase();
    RASTER_EXTENSIONS.iter().any(|ext| lower.ends_with(ext))
        && !lower.contains("icon")
        && !lower.contains("logo")
}

#[derive(Debug, Deserialize)]
struct QueryResponse<P> {
    query: Option<QueryBody<P>>,
}

#[derive(Debug, Deserialize)]
struct QueryBody<P> {
    #[serde(default = "Vec::new")]
    pages: Vec<P>,
}

#[derive(Debug, Deserialize)]
struct ImagesPage {
    #[serde(default)]
    images: Vec<ImageLink>,
}

#[derive(Debug, Deserialize)]
struct ImageLink {
    title: String,
}

#[derive(Debug, Deserialize)]
struct ImageInfoPage {
    title: String,
    #[serde(default)]
    imageinfo: Vec<ImageInfo>,
}

#[derive(Debug, Deserialize)]
struct ImageInfo {
    url: Option<String>,
    /// Present when a scaled rendition was requested
    thumburl: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

impl<P> QueryResponse<P> {
    fn into_pages(self) -> Vec<P> {
        self.query.map(|q| q.pages).unwrap_or_default()
    }
}

fn images_from_pages(pages: Vec<ImagesPage>) -> Vec<String> {
    pages
        .into_iter()
        .flat_map(|page| page.images)
        .map(|link| link.title)
        .filter(|title| is_displayable_media_title(title))
        .collect()
}

fn infos_from_pages(pages: Vec<ImageInfoPage>) -> Vec<MediaInfo> {
    pages
        .into_iter()
        .filter_map(|page| {
            let info = page.imageinfo.into_iter().next()?;
            Some(MediaInfo {
                title: page.title,
                url: info.thumburl.or(info.url)?,
                width: info.width.unwrap_or(0),
                height: info.height.unwrap_or(0),
            })
        })
        .collect()
}

/// MediaWiki action API client
#[derive(Debug, Clone)]
pub struct WikipediaApi {
    client: reqwest::Client,
    host_template: String,
}

impl WikipediaApi {
    pub fn new(config: &FeedConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout())
            .user_agent(concat!("feedswipe/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| FeedError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            host_template: config.api_host_template.clone(),
        })
    }

    fn endpoint(&self, locale: &str) -> String {
        format!("{}/w/api.php", self.host_template.replace("{locale}", locale))
    }

    async fn query<P>(&self, locale: &str, params: &[(&str, &str)]) -> Result<Vec<P>>
    where
        P: DeserializeOwned,
    {
        let response = self
            .client
            .get(self.endpoint(locale))
            .query(&[("action", "query"), ("format", "json"), ("formatversion", "2")])
            .query(params)
            .send()
            .await?
            .error_for_status()?;

        let body: QueryResponse<P> = response.json().await?;
        Ok(body.into_pages())
    }
}

#[async_trait]
impl ContentApi for WikipediaApi {
    async fn random_item(&self, locale: &str) -> Result<ApiItem> {
        let pages: Vec<ApiItem> = self
            .query(
                locale,
                &[
                    ("generator", "random"),
                    ("grnnamespace", "0"),
                    ("grnlimit", "1"),
                    ("prop", "extracts|info|pageimages"),
                    ("inprop", "url"),
                    ("exintro", "1"),
                    ("explaintext", "1"),
                    ("exsentences", "5"),
                    ("piprop", "thumbnail"),
                    ("pithumbsize", "800"),
                ],
            )
            .await?;

        pages
            .into_iter()
            .next()
            .ok_or_else(|| FeedError::InvalidItem("Random query returned no page".to_string()))
    }

    async fn item_media(&self, locale: &str, item_title: &str) -> Result<Vec<String>> {
        let pages: Vec<ImagesPage> = self
            .query(
                locale,
                &[("titles", item_title), ("prop", "images"), ("imlimit", "max")],
            )
            .await?;

        let titles = images_from_pages(pages);
        debug!(item = item_title, count = titles.len(), "item media listed");
        Ok(titles)
    }

    async fn media_info(&self, locale: &str, media_titles: &[String]) -> Result<Vec<MediaInfo>> {
        let mut infos = Vec::new();
        for chunk in media_titles.chunks(MEDIA_INFO_CHUNK) {
            let titles = chunk.join("|");
            let pages: Vec<ImageInfoPage> = self
                .query(
                    locale,
                    &[
                        ("titles", titles.as_str()),
                        ("prop", "imageinfo"),
                        ("iiprop", "url|size"),
                        ("iiurlwidth", SCALED_MEDIA_WIDTH),
                    ],
                )
                .await?;
            infos.extend(infos_from_pages(pages));
        }
        Ok(infos)
    }
}

#[async_trait]
impl ImageFetcher for WikipediaApi {
    async fn fetch_bytes(&self, url: &str) -> Result<Vec<u8>> {
        let bytes = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .bytes()
            .await?;
        Ok(bytes.to_vec())
    }
}
