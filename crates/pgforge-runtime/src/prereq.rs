use std::fmt;
use std::net::{Ipv4Addr, SocketAddr, TcpStream};
use std::process::Command;
use std::time::Duration;

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

fn command_succeeds(program: &str, args: &[&str]) -> bool {
    Command::new(program)
        .args(args)
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// Check everything the Docker backend shells out to.
/// Returns a list of missing items. Empty list means all prerequisites are met.
pub fn check_docker_prereqs(binary: &str) -> Vec<MissingPrereq> {
    let mut missing = Vec::new();

    if !command_succeeds(binary, &["--version"]) {
        missing.push(MissingPrereq {
            name: "container CLI",
            purpose: "building images and running containers",
            install_hint: "https://docs.docker.com/engine/install/ (or podman)",
        });
        return missing;
    }

    if !command_succeeds(binary, &["info"]) {
        missing.push(MissingPrereq {
            name: "container daemon",
            purpose: "running containers",
            install_hint: "start the daemon, e.g.: sudo systemctl start docker",
        });
    }

    if !command_succeeds(binary, &["buildx", "version"]) {
        missing.push(MissingPrereq {
            name: "buildx",
            purpose: "multi-platform image builds",
            install_hint: "apt install docker-buildx-plugin | dnf install docker-buildx-plugin",
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
    msg.push_str("\npgforge requires these tools to build images and run containers.");
    msg
}

/// Whether something on the local host already accepts connections on `port`.
pub fn port_in_use(port: u16) -> bool {
    let addr = SocketAddr::from((Ipv4Addr::LOCALHOST, port));
    TcpStream::connect_timeout(&addr, Duration::from_millis(500)).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn missing_prereq_display() {
        let m = MissingPrereq {
            name: "buildx",
            purpose: "image builds",
            install_hint: "apt install docker-buildx-plugin",
        };
        let s = format!("{m}");
        assert!(s.contains("buildx"));
        assert!(s.contains("image builds"));
        assert!(s.contains("apt install docker-buildx-plugin"));
    }

    #[test]
    fn format_missing_produces_readable_output() {
        let items = vec![
            MissingPrereq {
                name: "container CLI",
                purpose: "containers",
                install_hint: "install docker",
            },
            MissingPrereq {
                name: "buildx",
                purpose: "builds",
                install_hint: "install buildx",
            },
        ];
        let output = format_missing(&items);
        assert!(output.contains("missing prerequisites:"));
        assert!(output.contains("container CLI"));
        assert!(output.contains("buildx"));
    }

    #[test]
    fn missing_cli_short_circuits() {
        let missing = check_docker_prereqs("pgforge-definitely-not-a-binary");
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].name, "container CLI");
    }

    #[test]
    fn bound_port_is_in_use() {
        let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = listener.local_addr().unwrap().port();
        assert!(port_in_use(port));
    }

    #[test]
    fn released_port_is_free() {
        let port = {
            let listener = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
            listener.local_addr().unwrap().port()
        };
        assert!(!port_in_use(port));
    }
}
