// src/notify/format.rs
//! Projection of feed events into chat-ready notifications.

use crate::ingest::types::{EventCategory, RawEvent};
use crate::notify::{Footer, NormalizedNotification, NotificationField, NotificationKind};

pub const ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
pub const UNNAMED_ASSET: &str = "Unnamed NFT";
pub const UNKNOWN_ADDRESS: &str = "Unknown";

pub const OPENSEA_LOGO: &str = "https://files.readme.io/566c72b-opensea-logomark-full-colored.png";
pub const POAP_GALLERY_BASE_URL: &str = "https://poap.gallery/event/";
pub const ETHERSCAN_TX_BASE_URL: &str = "https://etherscan.io/tx/";
pub const ETHERSCAN_ADDR_BASE_URL: &str = "https://etherscan.io/address/";

pub const COLOR_MINTED: u32 = 0x0099ff;
pub const COLOR_SALE: u32 = 0x197468;
pub const COLOR_TRANSFER: u32 = 0xe77b93;

const ETHER_SYMBOL: char = 'Ξ';
const WEI_DECIMALS: usize = 18;

pub fn normalize(ev: &RawEvent) -> NormalizedNotification {
    let name = display_name(ev);

    let mut fields = vec![event_field(ev, &name)];
    let (kind, title, color, footer) = match ev.category {
        EventCategory::Transfer => {
            let minted = ev.from_address.as_deref() == Some(ZERO_ADDRESS);
            fields.push(field("To", hyperlink_addr(ev.to_address.as_deref())));
            fields.push(field("From", hyperlink_addr(ev.from_address.as_deref())));
            if minted {
                (NotificationKind::Minted, format!("Minted: {name}"), COLOR_MINTED, None)
            } else {
                (
                    NotificationKind::Transfer,
                    format!("Transfer: {name}"),
                    COLOR_TRANSFER,
                    Some(opensea_footer("Transferred on OpenSea")),
                )
            }
        }
        EventCategory::Sale => {
            let amount = format_ether(ev.total_price.as_deref().unwrap_or("0"));
            fields.push(field("Amount", format!("{ETHER_SYMBOL}{amount}")));
            fields.push(field("Buyer", hyperlink_addr(ev.to_address.as_deref())));
            fields.push(field("Seller", hyperlink_addr(ev.from_address.as_deref())));
            (
                NotificationKind::Sale,
                format!("Sold: {name}"),
                COLOR_SALE,
                Some(opensea_footer("Sold on OpenSea")),
            )
        }
    };

    if let Some(hash) = ev.tx_hash() {
        let url = format!("{ETHERSCAN_TX_BASE_URL}{hash}");
        fields.push(field("Transaction", format!("[{url}]({url})")));
    }

    NormalizedNotification {
        kind,
        tx_key: ev.tx_key.clone(),
        title,
        color,
        url: ev.asset.permalink.clone(),
        thumbnail_url: ev.asset.collection_image_url.clone(),
        image_url: ev.asset.image_url.clone(),
        timestamp: ev.created_at,
        fields,
        footer,
    }
}

/// Asset name, or a placeholder when upstream has none.
pub fn display_name(ev: &RawEvent) -> String {
    ev.asset
        .name
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .unwrap_or(UNNAMED_ASSET)
        .to_string()
}

/// POAP event id: second-to-last path segment of the asset's external link.
pub fn poap_event_id(external_link: &str) -> Option<&str> {
    let mut segs = external_link.rsplit('/');
    segs.next()?;
    segs.next().filter(|s| !s.is_empty())
}

pub fn hyperlink_addr(addr: Option<&str>) -> String {
    match addr.map(str::trim).filter(|a| !a.is_empty()) {
        Some(a) => format!("[{a}]({ETHERSCAN_ADDR_BASE_URL}{a})"),
        None => UNKNOWN_ADDRESS.to_string(),
    }
}

/// Format a wei amount as ether: at least one fractional digit, trailing
/// zeros trimmed. Anything that is not a non-negative integer reads as 0.
pub fn format_ether(wei: &str) -> String {
    let digits = wei.trim();
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return "0.0".to_string();
    }
    let digits = digits.trim_start_matches('0');
    let padded = format!("{digits:0>width$}", width = WEI_DECIMALS + 1);
    let (whole, frac) = padded.split_at(padded.len() - WEI_DECIMALS);
    let frac = frac.trim_end_matches('0');
    format!("{whole}.{}", if frac.is_empty() { "0" } else { frac })
}

fn event_field(ev: &RawEvent, name: &str) -> NotificationField {
    let value = match ev.asset.external_link.as_deref().and_then(poap_event_id) {
        Some(id) => format!("[{name} (#{id})]({POAP_GALLERY_BASE_URL}{id})"),
        None => name.to_string(),
    };
    NotificationField {
        name: "Event".to_string(),
        value,
        inline: true,
    }
}

fn field(name: &str, value: String) -> NotificationField {
    NotificationField {
        name: name.to_string(),
        value,
        inline: false,
    }
}

fn opensea_footer(text: &str) -> Footer {
    Footer {
        text: text.to_string(),
        icon_url: Some(OPENSEA_LOGO.to_string()),
    }
}
