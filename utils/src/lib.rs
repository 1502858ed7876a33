//! Test tooling shared by the workspace crates.

pub mod sqlx_tester;
