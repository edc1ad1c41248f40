pub mod health;
pub mod inject;
pub mod schemas;
