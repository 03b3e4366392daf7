use crate::core::kills::Killmail;
use crate::core::news::{summarize, Article};
use crate::core::wormholes::WormholeConnection;
use poise::serenity_prelude as serenity;

const ZKILL_ICON: &str = "https://zkillboard.com/img/wreck.png";
const CCP_ICON: &str = "https://www.ccpgames.com/img/ccp_logo.png";
const EVE_SCOUT_LOGO: &str = "https://www.eve-scout.com/images/eve-scout-logo.png";

/// Turns a feed payload into the embed posted to subscribed channels.
pub trait FeedEmbed {
    fn embed(&self) -> serenity::CreateEmbed;
}

impl FeedEmbed for Killmail {
    fn embed(&self) -> serenity::CreateEmbed {
        let link = self.link();
        let location = self
            .location
            .as_ref()
            .and_then(|l| l.system_name.clone())
            .unwrap_or_else(|| format!("System {}", self.solar_system_id));

        let mut embed = serenity::CreateEmbed::new()
            .title(format!("Kill in {}", location))
            .url(link.clone())
            .author(
                serenity::CreateEmbedAuthor::new("zKillboard")
                    .icon_url(ZKILL_ICON)
                    .url(link.clone()),
            )
            .color(serenity::Colour::RED)
            .field("Victim", combatant_line(&self.victim), true)
            .field("Value", format!("{} ISK", format_isk(self.zkb.total_value)), true)
            .field("Damage Taken", self.victim.damage.to_string(), true);

        if let Some(ship) = self.victim.ship_type_id {
            embed = embed.thumbnail(format!("https://images.evetech.net/types/{}/render?size=64", ship));
        }

        if let Some(final_blow) = self.final_blow() {
            embed = embed.field("Final Blow", combatant_line(final_blow), true);
        }

        let mut tags = Vec::new();
        if self.zkb.solo {
            tags.push("Solo");
        }
        if self.zkb.npc {
            tags.push("NPC");
        }
        if !tags.is_empty() {
            embed = embed.field("Tags", tags.join(", "), true);
        }

        if let Some(time) = self.killmail_time.and_then(timestamp) {
            embed = embed.timestamp(time);
        }

        embed.field("Link", link, false)
    }
}

impl FeedEmbed for Article {
    fn embed(&self) -> serenity::CreateEmbed {
        let mut embed = serenity::CreateEmbed::new()
            .title(&self.title)
            .description(summarize(&self.description))
            .author(
                serenity::CreateEmbedAuthor::new(format!("EVE Online {}", self.category.label()))
                    .icon_url(CCP_ICON),
            )
            .color(serenity::Colour::from_rgb(88, 101, 242));

        if !self.link.is_empty() {
            embed = embed.url(&self.link).field("Link", &self.link, false);
        }
        if let Some(author) = &self.author {
            embed = embed.footer(serenity::CreateEmbedFooter::new(author));
        }
        if let Some(time) = self.published_at.and_then(timestamp) {
            embed = embed.timestamp(time);
        }

        embed
    }
}

impl FeedEmbed for WormholeConnection {
    fn embed(&self) -> serenity::CreateEmbed {
        let mut embed = serenity::CreateEmbed::new()
            .title("Thera Alert")
            .author(serenity::CreateEmbedAuthor::new("EVE-Scout"))
            .thumbnail(EVE_SCOUT_LOGO)
            .color(serenity::Colour::BLURPLE)
            .field("Region", &self.region_name, true)
            .field("System", &self.destination_system, true)
            .field(
                "Signature (In - Out)",
                format!("`{}` - `{}`", self.signature_in, self.signature_out),
                true,
            )
            .field("Type", &self.wormhole_type, true);

        if let Some(time) = self.created_at.and_then(timestamp) {
            embed = embed.timestamp(time);
        }

        embed
    }
}

fn timestamp(time: chrono::DateTime<chrono::Utc>) -> Option<serenity::Timestamp> {
    serenity::Timestamp::from_unix_timestamp(time.timestamp()).ok()
}

fn combatant_line(combatant: &crate::core::kills::Combatant) -> String {
    if let Some(id) = combatant.character_id {
        format!("[Character {id}](https://zkillboard.com/character/{id}/)")
    } else if let Some(id) = combatant.corporation_id {
        format!("[Corporation {id}](https://zkillboard.com/corporation/{id}/)")
    } else {
        "Unknown".to_string()
    }
}

/// Short ISK amount, e.g. `12.50M`.
pub fn format_isk(value: f64) -> String {
    const UNITS: [(f64, &str); 3] = [(1e12, "T"), (1e9, "B"), (1e6, "M")];

    for (scale, suffix) in UNITS {
        if value >= scale {
            return format!("{:.2}{}", value / scale, suffix);
        }
    }
    format!("{:.0}", value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::feeds::Category;

    #[test]
    fn isk_amounts() {
        assert_eq!(format_isk(12_500_000.5), "12.50M");
        assert_eq!(format_isk(3_200_000_000.0), "3.20B");
        assert_eq!(format_isk(950.0), "950");
    }

    #[test]
    fn article_embed_carries_title_and_link() {
        let article = Article {
            id: "1".to_string(),
            title: "Equinox".to_string(),
            link: "https://www.eveonline.com/news/view/equinox".to_string(),
            description: "New sovereignty".to_string(),
            author: Some("CCP Games".to_string()),
            category: Category::News,
            published_at: None,
        };

        let json = serde_json::to_value(article.embed()).unwrap();
        assert_eq!(json["title"], "Equinox");
        assert_eq!(json["url"], "https://www.eveonline.com/news/view/equinox");
        assert_eq!(json["author"]["name"], "EVE Online News");
    }
}
