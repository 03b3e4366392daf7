// This is the entry point of the Discord bot.
//
// **Architecture Overview:**
// - `core/` = Feed engine and feed domains (platform-agnostic)
// - `infra/` = Implementations of core traits (SQLite, HTTP feed sources)
// - `discord/` = Discord-specific adapters (commands, embeds, delivery)
//
// This file's job is to:
// 1. Load configuration
// 2. Wire stores, sources and watchers together
// 3. Set up the Discord framework
// 4. Shut everything down cleanly on Ctrl+C

// These attrs point each module declaration at a more descriptive root file
// so we don't end up with half a dozen mod.rs files that all look the same.
#[path = "core/core_layer.rs"]
mod core;
#[path = "discord/discord_layer.rs"]
mod discord;
#[path = "infra/infra_layer.rs"]
mod infra;

mod config;

use crate::config::{BotConfig, FeedSettings};
use crate::core::feeds::{
    CursorStrategy, EntityNameResolver, FeedConfig, FeedGateway, FeedKind, FeedService,
    FeedSource, FeedStore, FeedWatcher, WatcherHandle,
};
use crate::core::kills::Killmail;
use crate::core::news::Article;
use crate::core::wormholes::WormholeConnection;
use crate::discord::feeds::{FeedEmbed, GatewayStatus, SerenityGateway};
use crate::discord::{Data, Error};
use crate::infra::feeds::{JsonHttpClient, SqliteFeedStore};
use crate::infra::kills::{EsiLocationResolver, EsiNameResolver, ZkillRedisQSource};
use crate::infra::news::EveNewsSource;
use crate::infra::wormholes::EveScoutSource;
use anyhow::Context as _;
use poise::serenity_prelude as serenity;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Event handler for non-command Discord events.
/// Only connection state matters here: watchers hold deliveries while the
/// gateway is down.
async fn event_handler(
    _ctx: &serenity::Context,
    event: &serenity::FullEvent,
    _framework: poise::FrameworkContext<'_, Data, Error>,
    data: &Data,
) -> Result<(), Error> {
    match event {
        serenity::FullEvent::Ready { data_about_bot } => {
            tracing::info!(user = %data_about_bot.user.name, "Connected to Discord");
            data.gateway.set_ready(true);
        }
        serenity::FullEvent::Resume { .. } => data.gateway.set_ready(true),
        serenity::FullEvent::ShardStageUpdate { event } => {
            tracing::debug!(shard = ?event.shard_id, stage = ?event.new, "Shard stage changed");
            data.gateway
                .set_ready(event.new == serenity::ConnectionStage::Connected);
        }
        _ => {}
    }

    Ok(())
}

/// Build one watcher and start its loop.
fn start_feed<P>(
    kind: FeedKind,
    settings: &FeedSettings,
    strategy: CursorStrategy,
    deliver_backlog: bool,
    sources: Vec<Arc<dyn FeedSource<P>>>,
    store: Arc<dyn FeedStore>,
    gateway: Arc<SerenityGateway>,
) -> anyhow::Result<WatcherHandle>
where
    P: FeedEmbed + Send + Sync + 'static,
{
    let gateway: Arc<dyn FeedGateway<P>> = gateway;
    let config = FeedConfig {
        kind,
        poll_interval: settings.interval,
        strategy,
        deliver_backlog,
    };
    let watcher = Arc::new(FeedWatcher::new(config, sources, store, gateway));
    let handle = Arc::clone(&watcher).start()?;

    tracing::info!(
        feed = %watcher.kind(),
        interval_secs = settings.interval.as_secs(),
        "Feed watcher started"
    );
    Ok(handle)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file (if it exists)
    dotenv::dotenv().ok();

    // RUST_LOG wins; plain `info` otherwise.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = BotConfig::from_env()?;

    // ========================================================================
    // DEPENDENCY INJECTION
    // ========================================================================
    // This is the "composition root" where we wire everything together.

    let store: Arc<dyn FeedStore> = Arc::new(
        SqliteFeedStore::new(&config.database_url)
            .await
            .context("Failed to initialize SQLite feed store")?,
    );
    let http = Arc::new(
        JsonHttpClient::new(&config.contact, config.fetch_timeout)
            .context("Failed to create HTTP client")?,
    );

    let feeds = Arc::new(FeedService::new(Arc::clone(&store)));
    let names: Arc<dyn EntityNameResolver> =
        Arc::new(EsiNameResolver::new(Arc::clone(&http), &config.esi_base_url));
    let gateway_status = GatewayStatus::default();

    // ========================================================================
    // DISCORD FRAMEWORK SETUP
    // ========================================================================

    let intents = serenity::GatewayIntents::GUILDS;

    let framework = {
        let feeds = Arc::clone(&feeds);
        let gateway_status = gateway_status.clone();

        poise::Framework::builder()
            .options(poise::FrameworkOptions {
                commands: vec![discord::commands::feeds::feed()],
                event_handler: |ctx, event, framework, data| {
                    Box::pin(event_handler(ctx, event, framework, data))
                },
                ..Default::default()
            })
            .setup(move |ctx, _ready, framework| {
                Box::pin(async move {
                    tracing::info!("Bot is starting up...");

                    // Register slash commands globally (can take up to an hour to propagate)
                    poise::builtins::register_globally(ctx, &framework.options().commands).await?;
                    tracing::info!("Commands registered");

                    gateway_status.set_ready(true);
                    Ok(Data {
                        feeds,
                        names,
                        gateway: gateway_status,
                    })
                })
            })
            .build()
    };

    let mut client = serenity::ClientBuilder::new(&config.discord_token, intents)
        .framework(framework)
        .await
        .context("Error creating client")?;

    // ========================================================================
    // FEED WATCHERS
    // ========================================================================
    // Watchers start right away; cycles are deferred until the gateway is ready.

    let gateway = Arc::new(SerenityGateway::new(client.http.clone(), gateway_status));
    let seen_set = CursorStrategy::SeenSet {
        max_retained: config.seen_retention,
    };

    if config.kills.enabled {
        let locations = Arc::new(EsiLocationResolver::new(Arc::clone(&http), &config.esi_base_url));
        let source = ZkillRedisQSource::new(
            Arc::clone(&http),
            &config.redisq_url,
            &config.zkill_queue_id,
            config.zkill_max_per_poll,
            locations,
        );
        let sources: Vec<Arc<dyn FeedSource<Killmail>>> = vec![Arc::new(source)];
        let handle = start_feed(
            FeedKind::Kills,
            &config.kills,
            seen_set,
            config.deliver_backlog,
            sources,
            Arc::clone(&store),
            gateway.clone(),
        )?;
        feeds.register(handle).await;
    }

    if config.news.enabled {
        let sources = EveNewsSource::all(Arc::clone(&http))
            .into_iter()
            .map(|source| Arc::new(source) as Arc<dyn FeedSource<Article>>)
            .collect();
        let handle = start_feed(
            FeedKind::News,
            &config.news,
            seen_set,
            config.deliver_backlog,
            sources,
            Arc::clone(&store),
            gateway.clone(),
        )?;
        feeds.register(handle).await;
    }

    if config.wormholes.enabled {
        let source = EveScoutSource::new(Arc::clone(&http), &config.eve_scout_url);
        let sources: Vec<Arc<dyn FeedSource<WormholeConnection>>> = vec![Arc::new(source)];
        let handle = start_feed(
            FeedKind::Wormholes,
            &config.wormholes,
            CursorStrategy::HighWatermark,
            config.deliver_backlog,
            sources,
            Arc::clone(&store),
            gateway.clone(),
        )?;
        feeds.register(handle).await;
    }

    // Stop the watchers first so no cycle is cut off mid-save, then the shards.
    let shard_manager = client.shard_manager.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }
        tracing::info!("Shutting down...");
        feeds.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    client.start().await.context("Error running bot")?;
    Ok(())
}
