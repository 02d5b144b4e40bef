pub mod brand;
pub mod credentials;
pub mod events;
pub mod models;
pub mod payloads;
pub mod products;
pub mod prompts;
pub mod url;
pub mod workflow;
