//! HTTP-backed capabilities: one cookie session for sign-in, listing and
//! item pages, and a REST client for the store.
mod airtable;
mod auth;
mod extract;
mod listing;
mod loader;
mod session;

pub use airtable::{AirtableClient, AirtableSettings, DEFAULT_API_URL};
pub use auth::{FormSignIn, SignInSettings};
pub use extract::SelectorExtractor;
pub use listing::{ListingSettings, PagedListing};
pub use loader::HttpItemLoader;
pub use session::{FetchSettings, HttpSession, Page};
