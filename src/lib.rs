pub mod error;
pub mod validation;
pub mod events;
pub mod config;
pub mod telemetry;
pub mod state;
pub mod demo_seeder;
pub mod db {
    pub mod models;
    pub mod collection;
    pub mod memory_collection;
    #[cfg(feature = "mongo")]
    pub mod mongo_collection;
    pub mod filter;
    pub mod query;
    pub mod loader;
    pub mod node_repository;
    pub mod link_repository;
    pub mod vote_repository;
    pub mod user_repository;
    #[cfg(test)]
    pub mod test_collection;
}
pub mod auth {
    pub mod password;
    pub mod token;
    pub mod service;
}
