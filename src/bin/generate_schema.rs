//! Generate JSON Schema for the jsh configuration file
//!
//! Usage:
//!   cargo run --features dev-bins --bin generate_schema > config-schema.json

use jsh::config::Config;
use schemars::schema_for;

fn main() -> anyhow::Result<()> {
    let schema = schema_for!(Config);
    let output = serde_json::to_string_pretty(&schema)?;
    println!("{}", output);
    Ok(())
}
