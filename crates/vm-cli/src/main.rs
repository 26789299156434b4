mod commands;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use commands::generate::GenerateArgs;
use commands::{Invocation, CONFIG_ERROR_PREFIX, EXIT_CONFIG_ERROR, EXIT_FAILURE};
use std::ffi::OsString;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use vm_core::{
    default_state_dir, install_interrupt_handler, resolve_tool_dir, ConfigSource, Context, Verb,
};

#[derive(Debug, Parser)]
#[command(
    name = "vm",
    version,
    about = "Declarative development environments on Docker or Vagrant"
)]
struct Cli {
    /// Path to vm.json or its directory. Without a value, search upward
    /// from the current directory.
    #[arg(
        long,
        global = true,
        num_args = 0..=1,
        default_missing_value = "",
        value_name = "PATH"
    )]
    config: Option<String>,

    /// Enable debug logging and verbose provisioning.
    #[arg(long, default_value_t = false, global = true)]
    debug: bool,

    /// Print what would be run without running it.
    #[arg(long, default_value_t = false, global = true)]
    dry_run: bool,

    /// Output results as structured JSON.
    #[arg(long, default_value_t = false, global = true)]
    json: bool,

    /// Enable trace-level logging (more detailed than --debug).
    #[arg(long, default_value_t = false, global = true)]
    trace: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Write a starter vm.json in the current directory.
    Init {
        /// Project name (defaults to the directory name).
        #[arg(long)]
        name: Option<String>,
        /// Overwrite an existing vm.json.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Generate a vm.json from flags, containing only the overrides.
    Generate {
        /// Services to enable, comma separated (e.g. postgresql,redis).
        #[arg(long, value_delimiter = ',')]
        services: Vec<String>,
        /// Port assignments, comma separated (e.g. web=3000,api=3001).
        #[arg(long, value_delimiter = ',')]
        ports: Vec<String>,
        /// Project name (defaults to the directory name).
        #[arg(long)]
        name: Option<String>,
        /// Backend: docker or vagrant.
        #[arg(long)]
        provider: Option<String>,
        /// Where to write the document.
        #[arg(long, short)]
        output: Option<PathBuf>,
        /// Print the document instead of writing it.
        #[arg(long, default_value_t = false)]
        stdout: bool,
        /// Overwrite an existing file.
        #[arg(long, default_value_t = false)]
        force: bool,
    },
    /// Check the merged configuration and report errors and warnings.
    Validate,
    /// List every environment this tool created.
    List {
        /// Query this backend without needing a vm.json.
        #[arg(long)]
        provider: Option<String>,
    },
    /// Create, start and provision the environment.
    Up,
    /// Open a shell in the environment, or run a command there.
    Ssh {
        /// Command to run instead of an interactive shell.
        #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Stop the environment, keeping its state.
    Halt,
    /// Remove the environment and its generated files.
    Destroy,
    /// Show the environment's state.
    Status,
    /// Halt, then bring the environment back up.
    Reload,
    /// Re-run the provisioning playbook on the running environment.
    Provision,
    /// Show service logs from the environment.
    Logs {
        /// Keep streaming new log lines.
        #[arg(long, short, default_value_t = false)]
        follow: bool,
    },
    /// Run a command in the environment without a TTY.
    Exec {
        /// Command and arguments to run.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        command: Vec<String>,
    },
    /// Force-stop the environment.
    Kill,
    /// Run the bundled test suite.
    Test {
        /// Suite to run (all suites when omitted).
        #[arg(long)]
        suite: Option<String>,
        /// Provider to test against.
        #[arg(long)]
        provider: Option<String>,
    },
    /// Generate shell completions for bash, zsh, fish, elvish, or powershell.
    Completions {
        /// Shell to generate completions for.
        shell: Shell,
    },
    /// Generate man pages in the specified directory.
    ManPages {
        /// Output directory for man pages.
        #[arg(default_value = "man")]
        dir: PathBuf,
    },
}

/// Process environment, read once.
#[derive(Debug, Default)]
struct Environment {
    config: Option<PathBuf>,
    project_dir: Option<PathBuf>,
    debug: bool,
    tool_dir: Option<PathBuf>,
    home: Option<PathBuf>,
    xdg_state_home: Option<PathBuf>,
    skip_prereqs: bool,
}

impl Environment {
    fn from_env() -> Self {
        let path = |key: &str| {
            std::env::var_os(key)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from)
        };
        let flag = |key: &str| std::env::var(key).is_ok_and(|v| truthy(&v));
        Self {
            config: path("VM_CONFIG"),
            project_dir: path("VM_PROJECT_DIR"),
            debug: flag("VM_DEBUG"),
            tool_dir: path("VM_TOOL_DIR"),
            home: path("HOME"),
            xdg_state_home: path("XDG_STATE_HOME"),
            skip_prereqs: flag("VM_SKIP_PREREQS"),
        }
    }
}

fn truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes" | "on"
    )
}

/// `--config` takes an optional value, so `vm --config up` would read `up`
/// as the path. A bare `--config` directly before a verb means "scan".
fn normalize_config_flag(args: Vec<OsString>) -> Vec<OsString> {
    let cmd = Cli::command();
    let is_verb = |arg: &OsString| {
        arg.to_str().is_some_and(|a| {
            a == "help"
                || cmd
                    .get_subcommands()
                    .any(|s| s.get_name() == a || s.get_all_aliases().any(|al| al == a))
        })
    };
    let mut out = Vec::with_capacity(args.len());
    let mut iter = args.into_iter().peekable();
    while let Some(arg) = iter.next() {
        if arg == "--config" && iter.peek().is_some_and(&is_verb) {
            out.push(OsString::from("--config="));
        } else {
            out.push(arg);
        }
    }
    out
}

fn config_source(flag: Option<&str>, env: &Environment) -> ConfigSource {
    match flag {
        Some("") => ConfigSource::Scan,
        Some(path) => ConfigSource::Explicit(PathBuf::from(path)),
        None => env
            .config
            .clone()
            .map_or(ConfigSource::CurrentDir, ConfigSource::Explicit),
    }
}

fn build_context(cli: &Cli, env: &Environment) -> Result<Context, String> {
    let cwd = std::env::current_dir().map_err(|e| format!("cannot read current directory: {e}"))?;
    let exe = std::env::current_exe().ok();
    let mut ctx = Context::new(cwd, resolve_tool_dir(env.tool_dir.clone(), exe.as_deref()));
    ctx.config = config_source(cli.config.as_deref(), env);
    ctx.project_dir_override.clone_from(&env.project_dir);
    ctx.debug = cli.debug || env.debug;
    ctx.dry_run = cli.dry_run;
    ctx.state_dir = default_state_dir(env.xdg_state_home.as_deref(), env.home.as_deref());
    ctx.home_dir.clone_from(&env.home);
    Ok(ctx)
}

fn main() -> ExitCode {
    let default_hook = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        let msg = info.to_string();
        if msg.contains("Broken pipe")
            || msg.contains("broken pipe")
            || msg.contains("os error 32")
            || msg.contains("failed printing to stdout")
        {
            std::process::exit(0);
        }
        default_hook(info);
    }));

    let cli = Cli::parse_from(normalize_config_flag(std::env::args_os().collect()));
    let env = Environment::from_env();

    let default_level = if cli.trace {
        "trace"
    } else if cli.debug || env.debug {
        "debug"
    } else {
        "warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env("VM_LOG")
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_target(false)
        .without_time()
        .with_writer(std::io::stderr)
        .init();

    let result = build_context(&cli, &env).and_then(|ctx| dispatch(cli, ctx, &env));

    match result {
        Ok(code) => ExitCode::from(code),
        Err(msg) => {
            eprintln!("{} {msg}", console::style("error:").red().bold());
            let code = if msg.starts_with(CONFIG_ERROR_PREFIX) {
                EXIT_CONFIG_ERROR
            } else {
                EXIT_FAILURE
            };
            ExitCode::from(code)
        }
    }
}

fn dispatch(cli: Cli, ctx: Context, env: &Environment) -> Result<u8, String> {
    let terminate = Arc::new(AtomicBool::new(false));
    if matches!(cli.command, Commands::Ssh { .. }) && !ctx.dry_run {
        install_interrupt_handler(Arc::clone(&terminate)).map_err(|e| e.to_string())?;
    }
    let inv = Invocation {
        ctx,
        json: cli.json,
        skip_prereqs: env.skip_prereqs,
        terminate,
    };

    match cli.command {
        Commands::Init { name, force } => commands::init::run(
            &inv.ctx.cwd,
            name.as_deref(),
            force,
            inv.json,
            &commands::TerminalPrompt,
        ),
        Commands::Generate {
            services,
            ports,
            name,
            provider,
            output,
            stdout,
            force,
        } => commands::generate::run(
            &inv.ctx.cwd,
            &GenerateArgs {
                name,
                provider,
                services,
                ports,
                output,
                stdout,
                force,
            },
            inv.json,
        ),
        Commands::Validate => commands::validate::run(&inv.ctx, inv.json),
        Commands::List { provider } => commands::list::run(&inv, provider.as_deref()),
        Commands::Status => commands::status::run(&inv),
        Commands::Up => commands::lifecycle::run(&inv, &Verb::Up),
        Commands::Ssh { command } => commands::lifecycle::run(&inv, &Verb::Ssh { command }),
        Commands::Halt => commands::lifecycle::run(&inv, &Verb::Halt),
        Commands::Destroy => commands::lifecycle::run(&inv, &Verb::Destroy),
        Commands::Reload => commands::lifecycle::run(&inv, &Verb::Reload),
        Commands::Provision => commands::lifecycle::run(&inv, &Verb::Provision),
        Commands::Logs { follow } => commands::lifecycle::run(&inv, &Verb::Logs { follow }),
        Commands::Exec { command } => commands::lifecycle::run(&inv, &Verb::Exec { command }),
        Commands::Kill => commands::lifecycle::run(&inv, &Verb::Kill),
        Commands::Test { suite, provider } => {
            commands::test::run(&inv.ctx.tool_dir, suite.as_deref(), provider.as_deref())
        }
        Commands::Completions { shell } => commands::completions::run::<Cli>(shell),
        Commands::ManPages { dir } => commands::man_pages::run::<Cli>(&dir),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn os(args: &[&str]) -> Vec<OsString> {
        args.iter().map(OsString::from).collect()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn bare_config_before_verb_means_scan() {
        let args = normalize_config_flag(os(&["vm", "--config", "up"]));
        let cli = Cli::parse_from(args);
        assert_eq!(cli.config.as_deref(), Some(""));
        assert!(matches!(cli.command, Commands::Up));
        assert_eq!(
            config_source(cli.config.as_deref(), &Environment::default()),
            ConfigSource::Scan
        );
    }

    #[test]
    fn config_path_is_kept() {
        let cli = Cli::parse_from(normalize_config_flag(os(&[
            "vm", "--config", "conf/vm.json", "status",
        ])));
        assert_eq!(
            config_source(cli.config.as_deref(), &Environment::default()),
            ConfigSource::Explicit(PathBuf::from("conf/vm.json"))
        );
    }

    #[test]
    fn trailing_config_flag_scans() {
        let cli = Cli::parse_from(os(&["vm", "up", "--config"]));
        assert_eq!(cli.config.as_deref(), Some(""));
    }

    #[test]
    fn env_config_applies_without_flag() {
        let env = Environment {
            config: Some(PathBuf::from("/etc/vm.json")),
            ..Environment::default()
        };
        assert_eq!(
            config_source(None, &env),
            ConfigSource::Explicit(PathBuf::from("/etc/vm.json"))
        );
        assert_eq!(config_source(Some(""), &env), ConfigSource::Scan);
        assert_eq!(
            config_source(None, &Environment::default()),
            ConfigSource::CurrentDir
        );
    }

    #[test]
    fn ssh_and_exec_take_trailing_commands() {
        let cli = Cli::parse_from(os(&["vm", "ssh", "ls", "-la"]));
        let Commands::Ssh { command } = cli.command else {
            panic!("expected ssh");
        };
        assert_eq!(command, vec!["ls", "-la"]);

        let cli = Cli::parse_from(os(&["vm", "exec", "--", "cat", "/tmp/x.log"]));
        let Commands::Exec { command } = cli.command else {
            panic!("expected exec");
        };
        assert_eq!(command, vec!["cat", "/tmp/x.log"]);

        assert!(Cli::try_parse_from(os(&["vm", "exec"])).is_err());
    }

    #[test]
    fn generate_splits_lists() {
        let cli = Cli::parse_from(os(&[
            "vm",
            "generate",
            "--services",
            "postgresql,redis",
            "--ports",
            "web=3000,api=3001",
        ]));
        let Commands::Generate {
            services, ports, ..
        } = cli.command
        else {
            panic!("expected generate");
        };
        assert_eq!(services, vec!["postgresql", "redis"]);
        assert_eq!(ports, vec!["web=3000", "api=3001"]);
    }

    #[test]
    fn truthy_values() {
        for v in ["1", "true", "TRUE", "yes", " on "] {
            assert!(truthy(v), "{v}");
        }
        for v in ["0", "false", "", "nope"] {
            assert!(!truthy(v), "{v}");
        }
    }
}
