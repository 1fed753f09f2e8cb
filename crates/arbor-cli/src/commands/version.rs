use arbor_core::version::{version_string, SCHEMA_VERSION, VERSION};
use miette::Result;

/// Print the version, or a JSON object with `--json`.
pub fn run(json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::json!({
                "ok": true,
                "version": VERSION,
                "schema_version": SCHEMA_VERSION,
            })
        );
    } else {
        println!("{}", version_string());
    }
    Ok(())
}
