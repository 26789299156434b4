use std::fmt;
use std::process::{Command, Stdio};

/// A missing prerequisite with actionable install instructions.
#[derive(Debug)]
pub struct MissingPrereq {
    pub name: &'static str,
    pub purpose: &'static str,
    pub install_hint: &'static str,
}

impl fmt::Display for MissingPrereq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "  - {}: {} (install: {})",
            self.name, self.purpose, self.install_hint
        )
    }
}

fn succeeds(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .is_ok_and(|s| s.success())
}

fn command_exists(name: &str) -> bool {
    succeeds("which", &[name])
}

/// Check prerequisites for the Docker backend. An empty list means the
/// backend can run.
pub fn check_docker_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists("docker") {
        missing.push(MissingPrereq {
            name: "docker",
            purpose: "container runtime for the docker provider",
            install_hint: "https://docs.docker.com/engine/install/ or Docker Desktop",
        });
        return missing;
    }

    if !succeeds("docker", &["compose", "version"]) {
        missing.push(MissingPrereq {
            name: "docker compose",
            purpose: "building and starting the development container",
            install_hint: "install the compose plugin (docker-compose-plugin)",
        });
    }

    if !succeeds("docker", &["info"]) {
        missing.push(MissingPrereq {
            name: "docker daemon",
            purpose: "running containers (daemon unreachable or permission denied)",
            install_hint: "start Docker (systemctl start docker) and add yourself to the docker group",
        });
    }

    missing
}

/// Check prerequisites for the Vagrant backend.
pub fn check_vagrant_prereqs() -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_exists("vagrant") {
        missing.push(MissingPrereq {
            name: "vagrant",
            purpose: "virtual machine management for the vagrant provider",
            install_hint: "https://developer.hashicorp.com/vagrant/install",
        });
    }

    let has_hypervisor = ["VBoxManage", "virsh", "prlctl", "vmrun"]
        .into_iter()
        .any(command_exists);
    if !has_hypervisor {
        missing.push(MissingPrereq {
            name: "hypervisor",
            purpose: "running the virtual machine",
            install_hint: "install one of: VirtualBox, libvirt, Parallels, or VMware",
        });
    }

    missing
}

/// Format a list of missing prerequisites into a user-friendly error message.
pub fn format_missing(missing: &[MissingPrereq]) -> String {
    use std::fmt::Write as _;
    let mut msg = String::from("missing prerequisites:\n");
    for m in missing {
        let _ = writeln!(msg, "{m}");
    }
    msg.push_str("\nInstall these, or switch \"provider\" in vm.json.");
    msg
}
