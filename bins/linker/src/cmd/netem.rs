use crate::error::ServerError;

const CONTAINERLAB: &str = "containerlab";

// ═══════════════════════════════════════════════════════════════
//  NetemCommand: `containerlab tools netem ...`
// ═══════════════════════════════════════════════════════════════

/// Аргументы вызова containerlab. Нулевые значения не попадают в команду.
#[derive(Debug, Clone, PartialEq)]
pub struct NetemCommand {
    args: Vec<String>,
}

impl NetemCommand {
    /// `tools netem set` для интерфейса узла `<clab>-<node>`.
    pub fn set(clab: &str, node: &str, interface: &str) -> Self {
        Self {
            args: vec![
                "tools".into(),
                "netem".into(),
                "set".into(),
                "-n".into(),
                format!("{clab}-{node}"),
                "-i".into(),
                interface.into(),
            ],
        }
    }

    /// `tools netem show` для узла `<clab>-<node>`.
    pub fn show(clab: &str, node: &str) -> Self {
        Self {
            args: vec![
                "tools".into(),
                "netem".into(),
                "show".into(),
                "-n".into(),
                format!("{clab}-{node}"),
            ],
        }
    }

    pub fn add_delay(&mut self, ms: u64) -> &mut Self {
        self.push_if(ms > 0, "--delay", format!("{ms}ms"))
    }

    pub fn add_jitter(&mut self, ms: u64) -> &mut Self {
        self.push_if(ms > 0, "--jitter", format!("{ms}ms"))
    }

    pub fn add_loss(&mut self, percent: f64) -> &mut Self {
        self.push_if(percent != 0.0, "--loss", format!("{percent:.6}"))
    }

    pub fn add_rate(&mut self, kbps: u64) -> &mut Self {
        self.push_if(kbps > 0, "--rate", kbps.to_string())
    }

    fn push_if(&mut self, cond: bool, flag: &str, value: String) -> &mut Self {
        if cond {
            self.args.push(flag.into());
            self.args.push(value);
        }
        self
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn render(&self) -> String {
        format!("{CONTAINERLAB} {}", self.args.join(" "))
    }

    /// Выполнить команду; stdout возвращается как есть.
    pub async fn execute(&self) -> Result<String, ServerError> {
        tracing::debug!(command = %self.render(), "executing");
        let output = tokio::process::Command::new(CONTAINERLAB)
            .args(&self.args)
            .output()
            .await
            .map_err(|e| ServerError::Command { command: self.render(), detail: e.to_string() })?;

        if !output.status.success() {
            return Err(ServerError::Command {
                command: self.render(),
                detail: format!(
                    "{}: {}",
                    output.status,
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
            });
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_values_are_omitted() {
        let mut cmd = NetemCommand::set("clab-hawkv6", "XR-1", "Gi0-0-0-1");
        cmd.add_delay(10).add_jitter(0).add_loss(0.5).add_rate(0);
        assert_eq!(
            cmd.render(),
            "containerlab tools netem set -n clab-hawkv6-XR-1 -i Gi0-0-0-1 --delay 10ms --loss 0.500000"
        );
    }

    #[test]
    fn bare_set_is_a_reset() {
        let reset = NetemCommand::set("lab", "XR-2", "Gi0-0-0-0");
        assert_eq!(reset.args().len(), 7);
        assert_eq!(reset.render(), "containerlab tools netem set -n lab-XR-2 -i Gi0-0-0-0");
    }

    #[test]
    fn show_targets_node() {
        assert_eq!(
            NetemCommand::show("clab-hawkv6", "XR-3").render(),
            "containerlab tools netem show -n clab-hawkv6-XR-3"
        );
    }

    #[test]
    fn all_flags_render_in_order() {
        let mut cmd = NetemCommand::set("lab", "R", "eth1");
        cmd.add_delay(5).add_jitter(2).add_loss(1.0).add_rate(10000);
        assert_eq!(
            cmd.args()[7..],
            ["--delay", "5ms", "--jitter", "2ms", "--loss", "1.000000", "--rate", "10000"]
        );
    }
}
