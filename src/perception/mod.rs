pub mod client;
pub mod screenshot;
pub mod traits;
pub mod types;

pub use client::OmniParserClient;
pub use traits::Perceiver;
pub use types::Perception;
