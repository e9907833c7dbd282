pub mod monitor;
pub mod orphans;
pub mod profile;
pub mod run;
pub mod validate;
