use crate::core::feeds::{
    Category, Destination, EntityKind, EntityNameResolver, EntityRef, FeedKind, FeedService,
    FeedServiceError, Subscription, SubscriptionScope, WatcherState,
};
use crate::discord::feeds::GatewayStatus;
use poise::serenity_prelude as serenity;
use std::sync::Arc;

/// Shared state for every command and the event handler.
pub struct Data {
    pub feeds: Arc<FeedService>,
    pub names: Arc<dyn EntityNameResolver>,
    pub gateway: GatewayStatus,
}

pub type Error = Box<dyn std::error::Error + Send + Sync>;

/// Discord rejects embed descriptions longer than this.
const EMBED_DESCRIPTION_LIMIT: usize = 4096;
pub type Context<'a> = poise::Context<'a, Data, Error>;

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum FeedChoice {
    #[name = "Kills"]
    Kills,
    #[name = "News"]
    News,
    #[name = "Thera Wormholes"]
    Wormholes,
}

impl From<FeedChoice> for FeedKind {
    fn from(value: FeedChoice) -> Self {
        match value {
            FeedChoice::Kills => FeedKind::Kills,
            FeedChoice::News => FeedKind::News,
            FeedChoice::Wormholes => FeedKind::Wormholes,
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum CategoryChoice {
    #[name = "Kills"]
    Kill,
    #[name = "News"]
    News,
    #[name = "Dev Blogs"]
    DevBlogs,
    #[name = "Patch Notes"]
    PatchNotes,
    #[name = "Thera Wormholes"]
    Wormhole,
}

impl From<CategoryChoice> for Category {
    fn from(value: CategoryChoice) -> Self {
        match value {
            CategoryChoice::Kill => Category::Kill,
            CategoryChoice::News => Category::News,
            CategoryChoice::DevBlogs => Category::DevBlog,
            CategoryChoice::PatchNotes => Category::PatchNotes,
            CategoryChoice::Wormhole => Category::Wormhole,
        }
    }
}

#[derive(Debug, Clone, Copy, poise::ChoiceParameter)]
pub enum EntityChoice {
    System,
    Constellation,
    Region,
    Character,
    Corporation,
    Alliance,
    #[name = "Ship Type"]
    Ship,
}

impl From<EntityChoice> for EntityKind {
    fn from(value: EntityChoice) -> Self {
        match value {
            EntityChoice::System => EntityKind::System,
            EntityChoice::Constellation => EntityKind::Constellation,
            EntityChoice::Region => EntityKind::Region,
            EntityChoice::Character => EntityKind::Character,
            EntityChoice::Corporation => EntityKind::Corporation,
            EntityChoice::Alliance => EntityKind::Alliance,
            EntityChoice::Ship => EntityKind::ShipType,
        }
    }
}

/// Root `/feed` command. Subcommands manage where feed items get posted.
#[poise::command(
    slash_command,
    guild_only,
    subcommands("subscribe", "unsubscribe", "list", "check", "status")
)]
pub async fn feed(ctx: Context<'_>) -> Result<(), Error> {
    ctx.say(
        "Feed commands:\n\
        `/feed subscribe <feed> [category] [entity] [id|name] [channel]` - Post a feed in a channel\n\
        `/feed unsubscribe <feed> [category] [entity] [id|name] [channel]` - Stop posting it\n\
        `/feed list` - Show every feed subscription in this server\n\
        `/feed check <feed>` - Poll a feed right now (admins only)\n\
        `/feed status` - Show which feeds are running",
    )
    .await?;
    Ok(())
}

/// Post a feed in a channel, optionally narrowed to a category or an entity.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn subscribe(
    ctx: Context<'_>,
    #[description = "Which feed"] feed: FeedChoice,
    #[description = "Only this category"] category: Option<CategoryChoice>,
    #[description = "Only items involving this kind of entity"] entity: Option<EntityChoice>,
    #[description = "Entity id (region 0 means every region)"] id: Option<u64>,
    #[description = "Entity name instead of an id, e.g. Jita or All Regions"] name: Option<String>,
    #[description = "Channel to post in (default: this one)"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let subscription = match build_subscription(ctx, feed, category, entity, id, name, channel).await {
        Ok(subscription) => subscription,
        Err(message) => {
            ctx.say(message).await?;
            return Ok(());
        }
    };

    let reply = match ctx.data().feeds.subscribe(subscription).await {
        Ok(true) => format!(
            "Now posting `{}` ({}) in {}.",
            subscription.feed, subscription.scope, subscription.destination
        ),
        Ok(false) => format!(
            "{} already receives `{}` ({}).",
            subscription.destination, subscription.feed, subscription.scope
        ),
        Err(FeedServiceError::Configuration(err)) => format!("❌ {err}"),
        Err(err) => return Err(err.into()),
    };

    ctx.say(reply).await?;
    Ok(())
}

/// Stop posting a feed subscription in a channel.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn unsubscribe(
    ctx: Context<'_>,
    #[description = "Which feed"] feed: FeedChoice,
    #[description = "Category the subscription was narrowed to"] category: Option<CategoryChoice>,
    #[description = "Entity kind the subscription was narrowed to"] entity: Option<EntityChoice>,
    #[description = "Entity id"] id: Option<u64>,
    #[description = "Entity name instead of an id"] name: Option<String>,
    #[description = "Channel (default: this one)"] channel: Option<serenity::GuildChannel>,
) -> Result<(), Error> {
    let subscription = match build_subscription(ctx, feed, category, entity, id, name, channel).await {
        Ok(subscription) => subscription,
        Err(message) => {
            ctx.say(message).await?;
            return Ok(());
        }
    };

    let reply = if ctx.data().feeds.unsubscribe(subscription).await? {
        format!(
            "Stopped posting `{}` ({}) in {}.",
            subscription.feed, subscription.scope, subscription.destination
        )
    } else {
        format!(
            "{} has no `{}` subscription for {}.",
            subscription.destination, subscription.feed, subscription.scope
        )
    };

    ctx.say(reply).await?;
    Ok(())
}

/// Show every feed subscription in this server.
#[poise::command(slash_command, guild_only)]
pub async fn list(ctx: Context<'_>) -> Result<(), Error> {
    let guild_id = ctx
        .guild_id()
        .ok_or("This command only works in servers")?
        .get();

    let subscriptions = ctx.data().feeds.list_subscriptions(guild_id).await?;
    if subscriptions.is_empty() {
        ctx.say("No feeds are posted in this server yet. Use `/feed subscribe` to add one.")
            .await?;
        return Ok(());
    }

    let lines: Vec<String> = subscriptions
        .iter()
        .map(|s| format!("• `{}` in {}: {}", s.feed, s.destination, s.scope))
        .collect();

    let embed = serenity::CreateEmbed::new()
        .title("Feed Subscriptions")
        .description(bounded_listing(&lines, EMBED_DESCRIPTION_LIMIT))
        .color(0x5865F2)
        .footer(serenity::CreateEmbedFooter::new(format!(
            "{} subscription(s)",
            subscriptions.len()
        )));

    ctx.send(poise::CreateReply::default().embed(embed)).await?;
    Ok(())
}

/// Poll a feed right away instead of waiting for its timer.
#[poise::command(slash_command, guild_only, required_permissions = "MANAGE_GUILD")]
pub async fn check(
    ctx: Context<'_>,
    #[description = "Which feed"] feed: FeedChoice,
) -> Result<(), Error> {
    let feed = FeedKind::from(feed);

    let reply = match ctx.data().feeds.poll_now(feed).await {
        Ok(()) => format!("Polling `{feed}` now. New items will show up shortly."),
        Err(FeedServiceError::FeedNotRunning(_)) => {
            format!("The `{feed}` feed is not running right now.")
        }
        Err(err) => return Err(err.into()),
    };

    ctx.say(reply).await?;
    Ok(())
}

/// Show which feed watchers are running.
#[poise::command(slash_command, guild_only)]
pub async fn status(ctx: Context<'_>) -> Result<(), Error> {
    let lines: Vec<String> = ctx
        .data()
        .feeds
        .status()
        .await
        .into_iter()
        .map(|(feed, state)| format!("`{feed}`: {}", state_label(state)))
        .collect();

    ctx.say(lines.join("\n")).await?;
    Ok(())
}

/// Join lines, one per row, stopping early with an "…and N more" row when
/// the rest would not fit in `limit` characters.
fn bounded_listing(lines: &[String], limit: usize) -> String {
    let reserve = format!("\n…and {} more", lines.len()).chars().count();
    let mut listing = String::new();
    let mut used = 0;

    for (shown, line) in lines.iter().enumerate() {
        let cost = line.chars().count() + usize::from(shown > 0);
        let last_fits = shown + 1 == lines.len() && used + cost <= limit;
        if !last_fits && used + cost + reserve > limit {
            if !listing.is_empty() {
                listing.push('\n');
            }
            listing.push_str(&format!("…and {} more", lines.len() - shown));
            break;
        }

        if shown > 0 {
            listing.push('\n');
        }
        listing.push_str(line);
        used += cost;
    }

    listing
}

fn state_label(state: WatcherState) -> &'static str {
    match state {
        WatcherState::Stopped => "stopped",
        WatcherState::Starting => "starting",
        WatcherState::Running => "running",
        WatcherState::Stopping => "stopping",
    }
}

/// How the command options name an entity, before any lookup.
#[derive(Debug, PartialEq, Eq)]
enum EntityOption {
    Absent,
    Id(EntityRef),
    Name(EntityKind, String),
}

fn entity_option(
    entity: Option<EntityChoice>,
    id: Option<u64>,
    name: Option<String>,
) -> Result<EntityOption, String> {
    let name = name.map(|n| n.trim().to_string()).filter(|n| !n.is_empty());
    match (entity, id, name) {
        (None, None, None) => Ok(EntityOption::Absent),
        (Some(kind), Some(id), None) => Ok(EntityOption::Id(EntityRef::new(kind.into(), id))),
        (Some(kind), None, Some(name)) => Ok(EntityOption::Name(kind.into(), name)),
        (Some(_), Some(_), Some(_)) => Err("❌ Give either an `id` or a `name`, not both.".to_string()),
        (Some(_), None, None) => Err("❌ Give the entity's `name` or numeric `id` as well.".to_string()),
        (None, _, _) => Err("❌ Pick which kind of `entity` the id or name belongs to.".to_string()),
    }
}

async fn lookup_entity(ctx: Context<'_>, kind: EntityKind, name: &str) -> Result<EntityRef, String> {
    match ctx.data().names.resolve_name(kind, name).await {
        Ok(Some(found)) => {
            tracing::debug!(%kind, name = %found.name, id = found.entity.id, "Resolved entity name");
            Ok(found.entity)
        }
        Ok(None) => Err(format!("❌ No {kind} named `{name}` was found.")),
        Err(err) => {
            tracing::warn!(%kind, name, error = %err, "Entity name lookup failed");
            Err(format!("❌ Could not look up `{name}` right now. Try again or use the numeric `id`."))
        }
    }
}

/// Turn command options into a subscription, or a message explaining what is wrong.
async fn build_subscription(
    ctx: Context<'_>,
    feed: FeedChoice,
    category: Option<CategoryChoice>,
    entity: Option<EntityChoice>,
    id: Option<u64>,
    name: Option<String>,
    channel: Option<serenity::GuildChannel>,
) -> Result<Subscription, String> {
    let guild_id = ctx
        .guild_id()
        .ok_or_else(|| "This command only works in servers".to_string())?
        .get();
    let channel_id = channel
        .map(|c| c.id)
        .unwrap_or_else(|| ctx.channel_id())
        .get();

    let feed = FeedKind::from(feed);
    let entity = match entity_option(entity, id, name)? {
        EntityOption::Absent => None,
        EntityOption::Id(entity) => Some(entity),
        EntityOption::Name(kind, name) => Some(lookup_entity(ctx, kind, &name).await?),
    };

    let scope = SubscriptionScope::from_parts(feed, category.map(Category::from), entity)
        .map_err(|err| format!("❌ {err}"))?;

    Ok(Subscription {
        destination: Destination::new(guild_id, channel_id),
        feed,
        scope,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn choices_map_onto_domain_values() {
        assert_eq!(FeedKind::from(FeedChoice::Wormholes), FeedKind::Wormholes);
        assert_eq!(Category::from(CategoryChoice::DevBlogs), Category::DevBlog);
        assert_eq!(EntityKind::from(EntityChoice::Ship), EntityKind::ShipType);
    }

    #[test]
    fn entity_options_take_an_id_or_a_name() {
        assert_eq!(entity_option(None, None, None), Ok(EntityOption::Absent));
        assert_eq!(
            entity_option(Some(EntityChoice::Alliance), Some(99_000_001), None),
            Ok(EntityOption::Id(EntityRef::new(EntityKind::Alliance, 99_000_001)))
        );
        assert_eq!(
            entity_option(Some(EntityChoice::System), None, Some(" Jita ".to_string())),
            Ok(EntityOption::Name(EntityKind::System, "Jita".to_string()))
        );

        assert!(entity_option(Some(EntityChoice::System), Some(30_000_142), Some("Jita".to_string())).is_err());
        assert!(entity_option(Some(EntityChoice::System), None, Some("  ".to_string())).is_err());
        assert!(entity_option(None, None, Some("Jita".to_string())).is_err());
        assert!(entity_option(None, Some(30_000_142), None).is_err());
    }

    #[test]
    fn short_listings_are_joined_as_is() {
        let lines = vec!["• one".to_string(), "• two".to_string()];
        assert_eq!(bounded_listing(&lines, EMBED_DESCRIPTION_LIMIT), "• one\n• two");
    }

    #[test]
    fn long_listings_stay_under_the_embed_limit() {
        let lines: Vec<String> = (0u64..300)
            .map(|n| format!("• `kills` in <#{}>: alliance 99000{:03}", 1_000_000_000_000 + n, n))
            .collect();
        assert!(lines.join("\n").chars().count() > EMBED_DESCRIPTION_LIMIT);

        let listing = bounded_listing(&lines, EMBED_DESCRIPTION_LIMIT);
        assert!(listing.chars().count() <= EMBED_DESCRIPTION_LIMIT);
        assert!(listing.starts_with(&lines[0]));

        let rows: Vec<&str> = listing.lines().collect();
        let hidden: usize = rows
            .last()
            .and_then(|row| row.strip_prefix("…and "))
            .and_then(|row| row.strip_suffix(" more"))
            .and_then(|n| n.parse().ok())
            .unwrap();
        assert_eq!(rows.len() - 1 + hidden, lines.len());
    }

    #[test]
    fn every_category_choice_belongs_to_a_feed() {
        for choice in [
            CategoryChoice::Kill,
            CategoryChoice::News,
            CategoryChoice::DevBlogs,
            CategoryChoice::PatchNotes,
            CategoryChoice::Wormhole,
        ] {
            let category = Category::from(choice);
            assert!(category.feed().categories().contains(&category));
        }
    }
}
