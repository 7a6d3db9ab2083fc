use anyhow::{bail, Result};
use csweave_compiler::render_explanation;

/// Text printed by `csweave explain <CODE>`.
pub fn explain(code: &str) -> Result<String> {
    match render_explanation(code) {
        Some(text) => Ok(text),
        None => bail!("unknown diagnostic code '{}'", code.trim()),
    }
}
