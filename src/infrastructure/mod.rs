pub mod database;
pub mod entities;
pub mod extraction;
pub mod knowledge;
pub mod repositories;
pub mod traits;
