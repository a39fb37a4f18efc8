use anyhow::{anyhow, Context, Result};
use std::io::Read;
use std::net::{SocketAddr, TcpStream};
use std::sync::OnceLock;
use std::time::Duration;

/// Keyboard-interactive prompt handler that always responds with the password
struct PasswordPrompt {
    password: String,
}

impl ssh2::KeyboardInteractivePrompt for PasswordPrompt {
    fn prompt<'a>(
        &mut self,
        _username: &str,
        _instructions: &str,
        prompts: &[ssh2::Prompt<'a>],
    ) -> Vec<String> {
        prompts.iter().map(|_| self.password.clone()).collect()
    }
}

/// Validate an IPv4 address (e.g., "192.168.1.1").
/// Returns true if the string is a valid dotted-decimal IPv4 address.
pub fn is_valid_ipv4(ip: &str) -> bool {
    let parts: Vec<&str> = ip.split('.').collect();
    if parts.len() != 4 {
        return false;
    }
    parts.iter().all(|p| p.parse::<u8>().is_ok())
}

/// Validate a hostname.
/// Allows alphanumeric, hyphens, dots, and underscores. No path separators or shell metacharacters.
pub fn is_valid_hostname(hostname: &str) -> bool {
    if hostname.is_empty() || hostname.len() > 253 {
        return false;
    }
    hostname.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '.' || c == '_')
}

/// Create an SSH session and authenticate with password, then keyboard-interactive.
/// This is blocking, so call from a spawn_blocking context.
pub fn ssh_connect(host: &str, user: &str, pass: &str, timeout_secs: u64) -> Result<ssh2::Session> {
    let addr: SocketAddr = format!("{}:22", host)
        .parse()
        .map_err(|e| anyhow!("Invalid address {}:22: {}", host, e))?;
    let timeout = Duration::from_secs(timeout_secs);

    let tcp = TcpStream::connect_timeout(&addr, timeout)
        .with_context(|| format!("TCP connection to {} failed", addr))?;
    tcp.set_read_timeout(Some(timeout)).ok();
    tcp.set_write_timeout(Some(timeout)).ok();

    let mut session = ssh2::Session::new().context("Failed to create SSH session")?;
    session.set_tcp_stream(tcp);
    session.set_timeout(session_timeout_ms(timeout_secs));
    session.handshake().context("SSH handshake failed")?;

    match session.userauth_password(user, pass) {
        Ok(_) if session.authenticated() => return Ok(session),
        _ => {}
    }

    // NX-OS with AAA servers often only offers keyboard-interactive
    let mut prompter = PasswordPrompt { password: pass.to_string() };
    let _ = session.userauth_keyboard_interactive(user, &mut prompter);

    if session.authenticated() {
        Ok(session)
    } else {
        Err(anyhow!("SSH authentication failed for {}@{}: all methods exhausted", user, host))
    }
}

/// libssh2 takes its blocking timeout in milliseconds as a u32
fn session_timeout_ms(timeout_secs: u64) -> u32 {
    u32::try_from(timeout_secs.saturating_mul(1000)).unwrap_or(u32::MAX)
}

/// Run one command on an open session and return its output.
/// This is blocking, so call from a spawn_blocking context.
pub fn ssh_exec(session: &ssh2::Session, command: &str) -> Result<String> {
    let mut channel = session.channel_session().context("Failed to open channel")?;
    channel
        .exec(command)
        .with_context(|| format!("Failed to execute '{}'", command))?;

    let mut output = String::new();
    channel
        .read_to_string(&mut output)
        .with_context(|| format!("Failed to read output of '{}'", command))?;
    channel.wait_close().context("Failed to close channel")?;

    // NX-OS reports CLI errors on stdout
    if let Some(error) = cli_error(&output) {
        return Err(anyhow!("'{}' rejected by device: {}", command, error));
    }
    Ok(output)
}

/// First NX-OS CLI error line in the output, if any
pub fn cli_error(output: &str) -> Option<&str> {
    static CLI_ERROR: OnceLock<Option<regex_lite::Regex>> = OnceLock::new();
    let re = CLI_ERROR
        .get_or_init(|| {
            regex_lite::Regex::new(
                r"(?m)^\s*%?\s*(Invalid (command|input|range)|Incomplete command|Ambiguous command|Syntax error).*$",
            )
            .ok()
        })
        .as_ref()?;
    re.find(output).map(|m| m.as_str().trim())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_valid_ipv4() {
        assert!(is_valid_ipv4("192.168.1.1"));
        assert!(is_valid_ipv4("0.0.0.0"));
        assert!(!is_valid_ipv4(""));
        assert!(!is_valid_ipv4("256.1.1.1"));
        assert!(!is_valid_ipv4("1.2.3"));
        assert!(!is_valid_ipv4("10.0.0.0/8"));
        assert!(!is_valid_ipv4("Ethernet1/1"));
    }

    #[test]
    fn test_is_valid_hostname() {
        assert!(is_valid_hostname("leaf-01"));
        assert!(is_valid_hostname("agg01.site1.local"));
        assert!(!is_valid_hostname(""));
        assert!(!is_valid_hostname("leaf 01"));
        assert!(!is_valid_hostname("../etc/passwd"));
    }

    #[test]
    fn test_cli_error() {
        assert_eq!(
            cli_error("show foo\n                ^\n% Invalid command at '^' marker.\n"),
            Some("% Invalid command at '^' marker.")
        );
        assert_eq!(cli_error("% Incomplete command\n"), Some("% Incomplete command"));
        assert_eq!(cli_error("{\"host_name\": \"agg01\"}"), None);
        // A description that happens to contain the words is not an error
        assert_eq!(cli_error("  description Invalid input port\n"), None);
    }

    #[test]
    fn test_session_timeout_saturates() {
        assert_eq!(session_timeout_ms(30), 30_000);
        assert_eq!(session_timeout_ms(5_000_000), u32::MAX);
        assert_eq!(session_timeout_ms(u64::MAX), u32::MAX);
    }
}
