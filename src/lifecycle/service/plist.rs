//! LaunchAgent property list

use std::fmt::Write as _;
use std::path::PathBuf;

/// A per-user launchd job description
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchAgent {
    pub label: String,
    pub program_arguments: Vec<String>,
    pub working_directory: Option<PathBuf>,
    pub run_at_load: bool,
    pub keep_alive: bool,
    pub stdout_path: Option<PathBuf>,
    pub stderr_path: Option<PathBuf>,
}

impl LaunchAgent {
    /// Render as an XML property list
    pub fn to_xml(&self) -> String {
        let mut xml = String::from(
            "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
             <!DOCTYPE plist PUBLIC \"-//Apple//DTD PLIST 1.0//EN\" \"http://www.apple.com/DTDs/PropertyList-1.0.dtd\">\n\
             <plist version=\"1.0\">\n\
             <dict>\n",
        );

        push_string(&mut xml, "Label", &self.label);

        xml.push_str("    <key>ProgramArguments</key>\n    <array>\n");
        for arg in &self.program_arguments {
            let _ = writeln!(xml, "        <string>{}</string>", escape(arg));
        }
        xml.push_str("    </array>\n");

        if let Some(dir) = &self.working_directory {
            push_string(&mut xml, "WorkingDirectory", &dir.to_string_lossy());
        }
        push_bool(&mut xml, "RunAtLoad", self.run_at_load);
        push_bool(&mut xml, "KeepAlive", self.keep_alive);
        if let Some(path) = &self.stdout_path {
            push_string(&mut xml, "StandardOutPath", &path.to_string_lossy());
        }
        if let Some(path) = &self.stderr_path {
            push_string(&mut xml, "StandardErrorPath", &path.to_string_lossy());
        }

        xml.push_str("</dict>\n</plist>\n");
        xml
    }
}

fn push_string(xml: &mut String, key: &str, value: &str) {
    let _ = writeln!(xml, "    <key>{key}</key>\n    <string>{}</string>", escape(value));
}

fn push_bool(xml: &mut String, key: &str, value: bool) {
    let _ = writeln!(xml, "    <key>{key}</key>\n    <{value}/>");
}

fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn agent() -> LaunchAgent {
        LaunchAgent {
            label: "com.puck.daemon".to_string(),
            program_arguments: vec![
                "/usr/local/bin/puck".to_string(),
                "run".to_string(),
                "--log-file".to_string(),
                "/Users/me/.local/share/puck/puck.log".to_string(),
            ],
            working_directory: None,
            run_at_load: true,
            keep_alive: true,
            stdout_path: Some(PathBuf::from("/tmp/puck.out")),
            stderr_path: None,
        }
    }

    #[test]
    fn test_renders_required_keys() {
        let xml = agent().to_xml();
        assert!(xml.starts_with("<?xml version=\"1.0\""));
        assert!(xml.contains("<key>Label</key>\n    <string>com.puck.daemon</string>"));
        assert!(xml.contains("        <string>run</string>\n        <string>--log-file</string>"));
        assert!(xml.contains("<key>RunAtLoad</key>\n    <true/>"));
        assert!(xml.contains("<key>StandardOutPath</key>"));
        assert!(!xml.contains("StandardErrorPath"));
        assert!(!xml.contains("WorkingDirectory"));
        assert!(xml.ends_with("</plist>\n"));
    }

    #[test]
    fn test_escapes_text() {
        let mut agent = agent();
        agent.program_arguments = vec!["/Apps/A & B/<puck>".to_string()];
        agent.keep_alive = false;

        let xml = agent.to_xml();
        assert!(xml.contains("<string>/Apps/A &amp; B/&lt;puck&gt;</string>"));
        assert!(xml.contains("<key>KeepAlive</key>\n    <false/>"));
    }
}
