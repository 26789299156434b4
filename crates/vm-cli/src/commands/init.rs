use super::{json_pretty, EXIT_SUCCESS};
use std::path::Path;
use vm_config::{
    derive_project_name, initial_document, sanitize_project_name, write_document, ConfirmPrompt,
    CONFIG_FILE_NAME,
};

fn confirm_overwrite(dest: &Path, force: bool, prompt: &dyn ConfirmPrompt) -> bool {
    if force || !dest.exists() {
        return force;
    }
    prompt.confirm(&format!("overwrite {}?", dest.display()))
}

pub fn run(
    cwd: &Path,
    name: Option<&str>,
    force: bool,
    json: bool,
    prompt: &dyn ConfirmPrompt,
) -> Result<u8, String> {
    let dest = cwd.join(CONFIG_FILE_NAME);
    let name = name
        .map(sanitize_project_name)
        .filter(|n| !n.is_empty())
        .or_else(|| derive_project_name(cwd))
        .unwrap_or_else(|| "my-project".to_owned());

    let overwrite = confirm_overwrite(&dest, force, prompt);
    let doc = initial_document(&name);
    write_document(&dest, &doc, overwrite).map_err(|e| e.to_string())?;

    if json {
        let payload = serde_json::json!({
            "status": "written",
            "path": dest,
            "name": name,
        });
        println!("{}", json_pretty(&payload)?);
    } else {
        println!("wrote {} for '{name}'", dest.display());
        println!("next: edit it, then run `vm up`");
    }
    Ok(EXIT_SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;
    use vm_config::DeclinePrompt;

    #[test]
    fn writes_directory_derived_name() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("My App");
        std::fs::create_dir_all(&dir).unwrap();

        run(&dir, None, false, true, &DeclinePrompt).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(dir.join("vm.json")).unwrap()).unwrap();
        assert_eq!(doc["project"]["name"], "my-app");
        assert!(doc.get("$schema").is_some());
    }

    #[test]
    fn refuses_to_overwrite_without_force() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("vm.json"), "{}").unwrap();

        let err = run(dir.path(), Some("x"), false, true, &DeclinePrompt).unwrap_err();
        assert!(err.contains("--force"), "{err}");
        assert_eq!(
            std::fs::read_to_string(dir.path().join("vm.json")).unwrap(),
            "{}"
        );

        run(dir.path(), Some("x"), true, true, &DeclinePrompt).unwrap();
        let written = std::fs::read_to_string(dir.path().join("vm.json")).unwrap();
        assert!(written.contains("\"x\""));
    }
}
