// tests/opensea_fixture.rs
//! Recorded feed pages through parsing, ordering and rendering.

use poap_bots::ingest::chronological;
use poap_bots::ingest::providers::opensea::parse_events;
use poap_bots::ingest::types::EventCategory;
use poap_bots::notify::format::{normalize, COLOR_MINTED, COLOR_SALE, COLOR_TRANSFER};
use poap_bots::notify::NotificationKind;

const SALES: &str = include_str!("fixtures/opensea_sales.json");
const TRANSFERS: &str = include_str!("fixtures/opensea_transfers.json");

#[test]
fn sales_page_renders_oldest_first_with_placeholders() {
    let events = chronological(parse_events(SALES, EventCategory::Sale).unwrap());
    let rendered: Vec<_> = events.iter().map(normalize).collect();

    let keys: Vec<_> = rendered.iter().map(|n| n.tx_key.as_str()).collect();
    assert_eq!(keys, vec!["0xsale1", "0xsale2", "0xsale3"]);
    assert!(rendered.iter().all(|n| n.kind == NotificationKind::Sale));
    assert!(rendered.iter().all(|n| n.color == COLOR_SALE));

    // null name, null price, null buyer
    let blank = &rendered[1];
    assert_eq!(blank.title, "Sold: Unnamed NFT");
    assert_eq!(blank.field("Amount"), Some("Ξ0.0"));
    assert_eq!(blank.field("Buyer"), Some("Unknown"));
    assert_eq!(blank.thumbnail_url, None);

    let newest = &rendered[2];
    assert_eq!(newest.title, "Sold: ETHGlobal Online 2021");
    assert_eq!(newest.field("Amount"), Some("Ξ0.25"));
    assert_eq!(
        newest.field("Event"),
        Some("[ETHGlobal Online 2021 (#1234)](https://poap.gallery/event/1234)")
    );
    assert_eq!(
        newest.image_url.as_deref(),
        Some("https://assets.poap.xyz/ethglobal-2021.png")
    );
}

#[test]
fn transfer_from_zero_address_renders_as_mint() {
    let events = chronological(parse_events(TRANSFERS, EventCategory::Transfer).unwrap());
    let rendered: Vec<_> = events.iter().map(normalize).collect();

    assert_eq!(rendered.len(), 2);
    assert_eq!(rendered[0].tx_key, "0xmint1");
    assert_eq!(rendered[0].kind, NotificationKind::Minted);
    assert_eq!(rendered[0].color, COLOR_MINTED);
    assert_eq!(rendered[0].title, "Minted: Devcon 5 Attendee");

    assert_eq!(rendered[1].kind, NotificationKind::Transfer);
    assert_eq!(rendered[1].color, COLOR_TRANSFER);
    assert_eq!(
        rendered[1].footer.as_ref().map(|f| f.text.as_str()),
        Some("Transferred on OpenSea")
    );
    assert_eq!(
        rendered[1].field("Transaction"),
        Some("[https://etherscan.io/tx/0xtransfer2](https://etherscan.io/tx/0xtransfer2)")
    );
}
