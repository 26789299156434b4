use super::{json_pretty, CONFIG_ERROR_PREFIX, EXIT_SUCCESS};
use std::path::{Path, PathBuf};
use vm_config::{
    default_document, generate_document, merge, parse_port_assignment, validate, write_document,
    GenerateOptions, Provider, CONFIG_FILE_NAME,
};

pub struct GenerateArgs {
    pub name: Option<String>,
    pub provider: Option<String>,
    pub services: Vec<String>,
    pub ports: Vec<String>,
    pub output: Option<PathBuf>,
    pub stdout: bool,
    pub force: bool,
}

fn options_from(args: &GenerateArgs) -> Result<GenerateOptions, String> {
    let provider = args
        .provider
        .as_deref()
        .map(str::parse::<Provider>)
        .transpose()
        .map_err(|e| e.to_string())?;
    let ports = args
        .ports
        .iter()
        .map(|p| parse_port_assignment(p))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| e.to_string())?;
    Ok(GenerateOptions {
        name: args.name.clone(),
        provider,
        services: args
            .services
            .iter()
            .map(|s| s.trim().to_owned())
            .filter(|s| !s.is_empty())
            .collect(),
        ports,
    })
}

pub fn run(cwd: &Path, args: &GenerateArgs, json: bool) -> Result<u8, String> {
    let options = options_from(args)?;
    let doc = generate_document(&options, cwd).map_err(|e| e.to_string())?;

    let report = validate(&merge(default_document(), &doc));
    for warning in &report.warnings {
        eprintln!("{} {warning}", console::style("warning:").yellow().bold());
    }
    report
        .ensure_valid()
        .map_err(|e| format!("{CONFIG_ERROR_PREFIX} generated document is invalid: {e}"))?;

    if args.stdout {
        println!("{}", json_pretty(&doc)?);
        return Ok(EXIT_SUCCESS);
    }

    let dest = args
        .output
        .as_ref()
        .map_or_else(|| cwd.join(CONFIG_FILE_NAME), |p| cwd.join(p));
    write_document(&dest, &doc, args.force).map_err(|e| e.to_string())?;

    if json {
        let payload = serde_json::json!({
            "status": "written",
            "path": dest,
            "document": doc,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("wrote {}", dest.display());
    }
    Ok(EXIT_SUCCESS)
}
