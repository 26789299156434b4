use super::{json_pretty, CONFIG_ERROR_PREFIX, EXIT_FAILURE, EXIT_SUCCESS};
use console::style;
use vm_config::{load, DeclinePrompt};
use vm_core::Context;

pub fn run(ctx: &Context, json: bool) -> Result<u8, String> {
    let loaded = load(&ctx.load_request(), &DeclinePrompt)
        .map_err(|e| format!("{CONFIG_ERROR_PREFIX} {e}"))?;
    let report = &loaded.report;

    if json {
        let payload = serde_json::json!({
            "valid": report.is_valid(),
            "config_path": loaded.doc_path,
            "project_dir": loaded.project_dir,
            "provider": loaded.merged.get("provider"),
            "errors": report.errors,
            "warnings": report.warnings,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        for error in &report.errors {
            eprintln!("{} {error}", style("error:").red().bold());
        }
        for warning in &report.warnings {
            eprintln!("{} {warning}", style("warning:").yellow().bold());
        }
        if report.is_valid() {
            println!(
                "{} {} is valid",
                style("✓").green(),
                loaded.doc_path.display()
            );
        }
    }

    Ok(if report.is_valid() {
        EXIT_SUCCESS
    } else {
        EXIT_FAILURE
    })
}
