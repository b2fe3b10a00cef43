//! # codeshare
//!
//! Wires the configured backend into the state containers, mirrors the
//! session, optionally signs in, and prints the feed.
//!
//! ```text
//! CODESHARE__BACKEND=rest CODESHARE__SUPABASE__URL=... CODESHARE__SUPABASE__ANON_KEY=... \
//!   CODESHARE_EMAIL=me@example.com CODESHARE_PASSWORD=... codeshare popular
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use chrono::Utc;
use configs::{AppConfig, BackendKind, LogFormat};
use domains::{post_age, FeedOrder, PostAge};
use services::{AppContext, Backend, ContextOptions, OAuthSettings};
use tracing_subscriber::EnvFilter;

const SESSION_SYNC_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cfg = AppConfig::load().context("loading configuration")?;
    init_tracing(&cfg);

    let order: FeedOrder = match std::env::args().nth(1) {
        Some(arg) => arg.parse().map_err(anyhow::Error::msg)?,
        None => FeedOrder::default(),
    };

    let backend = build_backend(&cfg)?;
    let identity = Arc::clone(&backend.identity);
    let ctx = AppContext::new(
        backend,
        ContextOptions {
            oauth: OAuthSettings {
                provider: cfg.auth.oauth_provider.clone(),
                scopes: cfg.auth.oauth_scopes.clone(),
                redirect_url: cfg.auth.redirect_url.clone(),
            },
            max_upload_bytes: cfg.uploads.max_bytes,
        },
    );

    let subscription = ctx.session.start().await;
    let refresher = cfg
        .auth
        .auto_refresh
        .then(|| auth_adapters::spawn_auto_refresh(Arc::clone(&identity), cfg.auth.refresh_margin()));

    if let (Ok(email), Ok(password)) = (std::env::var("CODESHARE_EMAIL"), std::env::var("CODESHARE_PASSWORD")) {
        match ctx.session.sign_in_with_password(&email, &password).await {
            Ok(session) => {
                tracing::info!(user_id = %session.user_id(), "signed in");
                // The feed reads the mirrored session for liked flags.
                if ctx.session.wait_for_session(session.user_id(), SESSION_SYNC_TIMEOUT).await.is_none() {
                    tracing::warn!("session not mirrored in time; liked flags may be missing");
                }
            }
            Err(e) => tracing::warn!(error = %e, "sign-in failed; continuing anonymously"),
        }
    }

    ctx.posts.fetch_posts().await;
    let state = ctx.posts.snapshot();
    if let Some(error) = &state.error {
        tracing::error!(%error, "feed unavailable");
    }
    print_feed(&ctx, order);

    if let Some(refresher) = refresher {
        refresher.shutdown().await;
    }
    if cfg.auth.sign_out_on_exit && ctx.session.is_signed_in() {
        ctx.session.sign_out().await;
    }
    subscription.shutdown().await;
    Ok(())
}

fn init_tracing(cfg: &AppConfig) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cfg.telemetry.log_level));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(false);
    match cfg.telemetry.log_format {
        LogFormat::Json => builder.json().init(),
        LogFormat::Pretty => builder.pretty().init(),
    }
}

fn build_backend(cfg: &AppConfig) -> anyhow::Result<Backend> {
    match cfg.backend {
        #[cfg(feature = "rest")]
        BackendKind::Rest => {
            use storage_adapters::rest::{
                BucketStorage, RestClient, RestCommentRepository, RestLikeRepository, RestPostRepository,
                RestProfileRepository,
            };

            let sb = &cfg.supabase;
            let client = RestClient::new(&sb.url, sb.anon_key.clone(), sb.request_timeout())
                .context("building REST client")?;
            let identity = auth_adapters::GoTrueIdentity::new(&sb.url, sb.anon_key.clone(), sb.request_timeout())
                .context("building identity client")?;
            tracing::info!(url = %sb.url, bucket = %sb.storage_bucket, "using hosted backend");
            Ok(Backend {
                identity: Arc::new(identity),
                posts: Arc::new(RestPostRepository::new(client.clone())),
                likes: Arc::new(RestLikeRepository::new(client.clone())),
                comments: Arc::new(RestCommentRepository::new(client.clone())),
                profiles: Arc::new(RestProfileRepository::new(client.clone())),
                media: Arc::new(BucketStorage::new(client, sb.storage_bucket.clone())),
            })
        }
        #[cfg(feature = "memory")]
        BackendKind::Memory => {
            let store = Arc::new(storage_adapters::InMemoryBackend::with_bucket(cfg.supabase.storage_bucket.clone()));
            let identity = auth_adapters::InMemoryIdentity::new();
            if let (Ok(email), Ok(password)) = (std::env::var("CODESHARE_EMAIL"), std::env::var("CODESHARE_PASSWORD")) {
                identity.register(&email, &password, Default::default());
            }
            tracing::info!("using in-memory backend");
            Ok(Backend {
                identity: Arc::new(identity),
                posts: store.clone(),
                likes: store.clone(),
                comments: store.clone(),
                profiles: store.clone(),
                media: store,
            })
        }
        #[allow(unreachable_patterns)]
        other => bail!("backend {other:?} is not compiled into this binary"),
    }
}

fn print_feed(ctx: &AppContext, order: FeedOrder) {
    let posts = ctx.posts.sorted_posts(order);
    if posts.is_empty() {
        println!("(no posts yet)");
        return;
    }
    let now = Utc::now();
    for post in posts {
        let author = post
            .author
            .as_ref()
            .and_then(|a| a.username.clone().or_else(|| a.full_name.clone()))
            .unwrap_or_else(|| "anonymous".to_string());
        let age = match post_age(post.created_at, now) {
            PostAge::UnderAnHour => "just now".to_string(),
            PostAge::Hours(h) => format!("{h}h ago"),
            PostAge::Yesterday => "yesterday".to_string(),
            PostAge::On(at) => at.format("%Y-%m-%d").to_string(),
        };
        let liked = if post.is_liked { "*" } else { " " };
        println!(
            "{liked} [{lang}] {title} by {author}, {age} ({likes} likes, {comments} comments)",
            lang = post.programming_language,
            title = post.title,
            likes = post.likes_count,
            comments = post.comments_count,
        );
    }
}
