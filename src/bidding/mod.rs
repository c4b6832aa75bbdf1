pub mod commands;
pub mod countdown;
pub mod error;
pub mod model;

pub use commands::{
    check_bid_intent, close_auction, close_expired_auctions, create_auction, place_bid,
    BidReceipt, PlaceBidCommand, MAX_RETRIES,
};
pub use countdown::{time_remaining, time_remaining_at, TimeRemaining};
pub use error::BidError;
pub use model::{AuctionItem, AuctionStatus, Bid, NewAuction};
