//! Headless host: binds one row, waits for the sharp image, saves it.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context, Result};
use tracing::{info, warn};

use crate::config::AppConfig;
use crate::library::{AuthorizationStatus, LocalMediaLibrary};
use crate::models::{Locator, PhotoRecord, PhotoUrls, UserRecord};
use crate::pipeline::{CachingImagePipeline, ImageCache, ImagePipeline};
use crate::source::{PhotoRowModel, RowEvent};
use crate::ui::controls::LikeIcon;
use crate::ui::RowWidget;

/// Slack on top of the HTTP timeout before the host stops waiting for the row.
const SETTLE_GRACE: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, PartialEq)]
pub struct DemoArgs {
    pub high_res: Locator,
    pub low_res: Option<Locator>,
    pub avatar: Option<Locator>,
    pub author: String,
    /// Tap like before saving.
    pub like: bool,
    /// Stored as the library's access decision before the save.
    pub access: Option<AuthorizationStatus>,
}

impl DemoArgs {
    pub fn parse(args: impl IntoIterator<Item = String>) -> Result<Self> {
        let mut high_res = None;
        let mut low_res = None;
        let mut avatar = None;
        let mut author = String::from("Unknown");
        let mut like = false;
        let mut access = None;

        let mut args = args.into_iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "--low" => {
                    let value = args.next().context("Missing value for --low")?;
                    low_res = Locator::parse(&value);
                }
                "--avatar" => {
                    let value = args.next().context("Missing value for --avatar")?;
                    avatar = Locator::parse(&value);
                }
                "--author" => {
                    author = args.next().context("Missing value for --author")?;
                }
                "--like" => like = true,
                "--access" => {
                    let value = args.next().context("Missing value for --access")?;
                    access = Some(value.parse::<AuthorizationStatus>().context(
                        "--access takes authorized, denied, restricted or not-determined",
                    )?);
                }
                other if other.starts_with('-') => bail!("Unknown option {other}"),
                _ => {
                    if high_res.is_some() {
                        bail!("Only one photo locator may be given");
                    }
                    high_res = Locator::parse(&arg);
                }
            }
        }

        let high_res = high_res
            .context("Usage: feedrow <photo> [--low <photo>] [--avatar <image>] [--author <name>] [--like] [--access <status>]")?;
        Ok(Self {
            high_res,
            low_res,
            avatar,
            author,
            like,
            access,
        })
    }
}

pub struct FeedRowApp {
    config: AppConfig,
    pipeline: Arc<CachingImagePipeline>,
    library: Arc<LocalMediaLibrary>,
}

impl FeedRowApp {
    pub fn new(config: AppConfig) -> Result<Self> {
        let cache = ImageCache::new(config.cache_entries, config.cache_memory_mb);
        let pipeline = Arc::new(CachingImagePipeline::new(cache, config.http_timeout));
        let library = Arc::new(
            LocalMediaLibrary::open(config.library.clone())
                .context("Failed to open photo library")?,
        );
        Ok(Self {
            config,
            pipeline,
            library,
        })
    }

    pub async fn run(&self, args: DemoArgs) -> Result<()> {
        let sharp = self
            .pipeline
            .load(&args.high_res)
            .await
            .with_context(|| format!("Failed to load {}", args.high_res))?;

        let photo = PhotoRecord {
            id: format!("{:016x}", xxhash_rust::xxh3::xxh3_64(args.high_res.as_str().as_bytes())),
            width: sharp.width(),
            height: sharp.height(),
            likes: 0,
            liked_by_user: false,
            updated_at: SystemTime::now(),
            user: UserRecord {
                username: args.author.to_lowercase().replace(' ', "_"),
                name: args.author.clone(),
                profile_image: args.avatar.clone(),
            },
            urls: PhotoUrls {
                small: args.low_res.clone(),
                regular: Some(args.high_res.clone()),
            },
            download: Some(args.high_res.clone()),
        };

        let (model, channels) = PhotoRowModel::new(photo, self.config.row_width);
        let row = RowWidget::new(self.pipeline.clone(), self.library.clone());
        let binding = row.bind(&model);

        let wait = self.config.http_timeout + SETTLE_GRACE;
        let high = args.high_res.clone();
        let snapshot = tokio::time::timeout(
            wait,
            row.wait_for(|s| s.content.as_ref() == Some(&high)),
        )
        .await
        .context("Timed out waiting for the photo")?;
        let shown = row.content_image().map(|image| (image.width(), image.height()));
        info!(
            token = binding.token(),
            author = %snapshot.full_name,
            username = %snapshot.username,
            height = snapshot.photo_height,
            avatar = snapshot.avatar.is_some(),
            like_icon = snapshot.like_icon.resource_name(),
            ?shown,
            "Row ready"
        );

        if args.like {
            row.tap_like();
            let liked = tokio::time::timeout(
                wait,
                row.wait_for(|s| s.like_icon == LikeIcon::Liked),
            )
            .await
            .context("Timed out waiting for the like to show")?;
            info!(
                likes = %liked.total_likes,
                like_icon = liked.like_icon.resource_name(),
                "Liked"
            );
        }

        if let Some(status) = args.access {
            self.library.set_authorization(status).await?;
        }
        info!(access = %self.library.authorization().await?, "Stored library access");

        if !row.tap_download() {
            bail!("Download action is not bound");
        }
        match tokio::time::timeout(wait, channels.alerts.recv_async()).await {
            Ok(Ok(alert)) => println!("{}\n{}", alert.title, alert.message),
            Ok(Err(_)) => warn!("Row model closed before an alert arrived"),
            Err(_) => warn!(
                "No alert; library access is undetermined or restricted (use --access or FEEDROW_ACCESS)"
            ),
        }

        for event in channels.events.drain() {
            let (kind, photo) = match &event {
                RowEvent::Liked(id) => ("liked", id.as_str()),
                RowEvent::Unliked(id) => ("unliked", id.as_str()),
                RowEvent::DetailsRequested(photo) => ("details", photo.id.as_str()),
                RowEvent::DownloadRequested(photo) => ("download", photo.id.as_str()),
            };
            info!(kind, photo, "Row event");
        }

        let assets = self.library.assets().await?;
        let cache = self.pipeline.cache();
        info!(
            root = ?self.library.root(),
            count = assets.len(),
            cached = cache.len(),
            cache_bytes = cache.memory_usage(),
            cache_budget = cache.max_memory(),
            "Library contents"
        );
        for asset in assets {
            info!(
                id = asset.id,
                file = %asset.file_name,
                width = asset.width,
                height = asset.height,
                source = %asset.source,
                "Saved photo"
            );
        }

        binding.cancel();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::library::{AccessPolicy, LibraryConfig};
    use crate::test_support::png_file;

    fn args(list: &[&str]) -> Result<DemoArgs> {
        DemoArgs::parse(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_parse_args() {
        let parsed = args(&["https://x/a.jpg", "--low", "https://x/a-small.jpg", "--author", "Ann Lee"]).unwrap();
        assert_eq!(parsed.high_res, Locator::from("https://x/a.jpg"));
        assert_eq!(parsed.low_res, Some(Locator::from("https://x/a-small.jpg")));
        assert_eq!(parsed.avatar, None);
        assert_eq!(parsed.author, "Ann Lee");
        assert!(!parsed.like);
        assert_eq!(parsed.access, None);

        let parsed = args(&["a.jpg", "--like", "--access", "denied"]).unwrap();
        assert!(parsed.like);
        assert_eq!(parsed.access, Some(AuthorizationStatus::Denied));
        assert!(args(&["a.jpg", "--access", "maybe"]).is_err());

        assert!(args(&[]).is_err());
        assert!(args(&["a.jpg", "b.jpg"]).is_err());
        assert!(args(&["a.jpg", "--low"]).is_err());
        assert!(args(&["a.jpg", "--verbose"]).is_err());
    }

    fn demo_app(root: &std::path::Path) -> FeedRowApp {
        FeedRowApp::new(AppConfig {
            library: LibraryConfig::new(root.join("library")).with_access(AccessPolicy::Grant),
            cache_entries: 8,
            cache_memory_mb: 16,
            http_timeout: Duration::from_secs(5),
            row_width: 300.0,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_run_saves_local_photo() {
        let dir = tempfile::tempdir().unwrap();
        let photo = png_file(dir.path(), "photo.png", 6, 4);
        let app = demo_app(dir.path());

        app.run(args(&[photo.to_str().unwrap()]).unwrap()).await.unwrap();

        let assets = app.library.assets().await.unwrap();
        assert_eq!(assets.len(), 1);
        assert_eq!((assets[0].width, assets[0].height), (6, 4));
        assert!(dir.path().join("library").join(&assets[0].file_name).exists());
    }

    #[tokio::test]
    async fn test_explicit_access_overrides_policy() {
        let dir = tempfile::tempdir().unwrap();
        let photo = png_file(dir.path(), "photo.png", 6, 4);
        let app = demo_app(dir.path());

        let path = photo.to_str().unwrap();
        app.run(args(&[path, "--like", "--access", "denied"]).unwrap())
            .await
            .unwrap();

        assert!(app.library.assets().await.unwrap().is_empty());
        assert_eq!(
            app.library.authorization().await.unwrap(),
            AuthorizationStatus::Denied
        );
    }
}
