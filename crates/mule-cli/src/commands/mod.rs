pub mod build;
pub mod clean;
pub mod graph;
pub mod lock;
pub mod new;
pub mod run;
