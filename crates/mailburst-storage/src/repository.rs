//! Repository layer for record access

pub mod campaigns;
pub mod recipients;
pub mod users;

pub use campaigns::CampaignRepository;
pub use recipients::RecipientRepository;
pub use users::UserRepository;
