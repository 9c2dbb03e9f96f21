// Contract Repository and the date/urgency utilities built on it.
// Handlers talk to the `ContractStore` trait only; the backend is chosen in main.

pub mod dates;
pub mod handlers;
pub mod memory;
pub mod models;
pub mod pg;
pub mod store;
