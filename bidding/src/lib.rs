pub mod scoring;
pub mod service;

pub use scoring::{calculate_bid_score, select_mode, ModeSelection, ModeSelectionError};
pub use service::{
    BidWindowDetail, BiddingError, BiddingService, CreateBidWindowOptions, CreateOutcome,
    NoShowSweepResult,
};
