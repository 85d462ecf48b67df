//! Pattern-rule signature matching
//!
//! Each rule carries static metadata and one compiled regex evaluated
//! against the decoded payload text, the request URI, and the User-Agent.
//! First match wins. Confidence is fixed per matched field: URI 0.9,
//! payload 0.8, user-agent 0.7.

use aho_corasick::AhoCorasick;
use nids_common::{Detection, DetectionKind, PacketRecord, Severity};
use regex::Regex;

const SOURCE: &str = "signature_matcher";

const URI_CONFIDENCE: f64 = 0.9;
const PAYLOAD_CONFIDENCE: f64 = 0.8;
const USER_AGENT_CONFIDENCE: f64 = 0.7;

/// User-Agent substrings that identify known attack tooling
const SUSPICIOUS_AGENTS: [&str; 9] = [
    "sqlmap", "nikto", "nmap", "masscan", "hydra", "metasploit", "dirbuster", "zgrab",
    "wfuzz",
];

struct PatternRule {
    id: &'static str,
    severity: Severity,
    description: &'static str,
    regex: Regex,
}

fn rule(id: &'static str, severity: Severity, description: &'static str, pattern: &str) -> PatternRule {
    PatternRule {
        id,
        severity,
        description,
        regex: Regex::new(pattern).expect("static rule pattern"),
    }
}

fn default_rules() -> Vec<PatternRule> {
    vec![
        rule(
            "sql_injection",
            Severity::High,
            "SQL injection attempt",
            r"(?i)(union\s+select|select\s+.+\s+from\s|insert\s+into\s|drop\s+table|'\s*or\s+'?1'?\s*=\s*'?1|xp_cmdshell)",
        ),
        rule(
            "xss_attack",
            Severity::High,
            "Cross-site scripting attempt",
            r"(?i)(<script|javascript:|onerror\s*=|onload\s*=|document\.cookie)",
        ),
        rule(
            "malware_communication",
            Severity::Critical,
            "Malware command-and-control traffic",
            r"(?i)(/gate\.php|beacon[_-]?id|botnet|cmd\.exe\s|powershell\s+-enc)",
        ),
        rule(
            "data_exfiltration",
            Severity::High,
            "Possible data exfiltration",
            r"(?i)(exfil|/etc/shadow|\.(sql|tar\.gz|zip)\b.{0,30}upload|begin\s+rsa\s+private\s+key)",
        ),
        rule(
            "path_traversal",
            Severity::High,
            "Directory traversal attempt",
            r"(?i)(\.\./\.\./|%2e%2e%2f|/etc/passwd)",
        ),
        rule(
            "suspicious_scanner",
            Severity::Medium,
            "Reconnaissance tooling observed",
            r"(?i)(nmap|masscan|nikto|dirbuster|gobuster|wfuzz)",
        ),
        rule(
            "brute_force",
            Severity::Medium,
            "Authentication brute-force indicator",
            r"(?i)(failed\s+login|authentication\s+fail|invalid\s+password|login\s+incorrect)",
        ),
    ]
}

/// Regex rules over payload, URI and User-Agent
pub struct SignatureMatcher {
    rules: Vec<PatternRule>,
    suspicious_agents: AhoCorasick,
}

impl SignatureMatcher {
    pub fn new() -> Self {
        Self {
            rules: default_rules(),
            suspicious_agents: AhoCorasick::builder()
                .ascii_case_insensitive(true)
                .build(SUSPICIOUS_AGENTS)
                .expect("static agent literals"),
        }
    }

    /// Rule id emitted on brute-force hits; the orchestrator watches for it
    pub const BRUTE_FORCE_ID: &'static str = "brute_force";

    /// Evaluate all pattern rules; first match wins
    pub fn match_packet(&self, pkt: &PacketRecord) -> Option<Detection> {
        let uri = pkt.http.as_ref().and_then(|h| h.uri.as_deref());
        let agent = pkt.http.as_ref().and_then(|h| h.user_agent.as_deref());
        let payload = pkt.payload_text();

        for rule in &self.rules {
            if let Some(uri) = uri {
                if rule.regex.is_match(uri) {
                    return Some(self.detection(rule, URI_CONFIDENCE, pkt));
                }
            }
            if !payload.is_empty() && rule.regex.is_match(&payload) {
                return Some(self.detection(rule, PAYLOAD_CONFIDENCE, pkt));
            }
        }

        if let Some(agent) = agent {
            if self.suspicious_agents.is_match(agent) {
                let rule = self
                    .rules
                    .iter()
                    .find(|r| r.id == "suspicious_scanner")?;
                return Some(self.detection(rule, USER_AGENT_CONFIDENCE, pkt));
            }
        }

        None
    }

    fn detection(&self, rule: &PatternRule, confidence: f64, pkt: &PacketRecord) -> Detection {
        Detection::new(
            DetectionKind::Signature,
            rule.id,
            rule.severity,
            confidence,
            rule.description,
            SOURCE,
        )
        .with_endpoints(pkt.src_ip, pkt.dst_ip, pkt.dst_port)
    }
}

impl Default for SignatureMatcher {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use nids_common::{HttpHints, Protocol};

    fn packet(payload: &[u8], http: Option<HttpHints>) -> PacketRecord {
        PacketRecord {
            timestamp: Utc::now(),
            src_ip: "10.0.0.5".parse().unwrap(),
            dst_ip: "10.0.0.1".parse().unwrap(),
            src_port: 50000,
            dst_port: 80,
            protocol: Protocol::Tcp,
            raw_len: 60 + payload.len(),
            payload_len: payload.len(),
            tcp_flags: None,
            payload: payload.to_vec(),
            http,
        }
    }

    #[test]
    fn test_sql_injection_in_payload() {
        let pkt = packet(b"q=union select * from users", None);
        let det = SignatureMatcher::new().match_packet(&pkt).unwrap();
        assert_eq!(det.rule_id, "sql_injection");
        assert_eq!(det.severity, Severity::High);
        assert_eq!(det.confidence, 0.8);
        assert_eq!(det.src_ip, Some("10.0.0.5".parse().unwrap()));
    }

    #[test]
    fn test_uri_match_outranks_payload() {
        let http = HttpHints {
            method: Some("GET".into()),
            uri: Some("/search?q='or 1=1--".into()),
            ..Default::default()
        };
        let pkt = packet(b"harmless body", Some(http));
        let det = SignatureMatcher::new().match_packet(&pkt).unwrap();
        assert_eq!(det.rule_id, "sql_injection");
        assert_eq!(det.confidence, 0.9);
    }

    #[test]
    fn test_suspicious_user_agent() {
        let http = HttpHints {
            method: Some("GET".into()),
            uri: Some("/".into()),
            user_agent: Some("Mozilla/5.0 sqlmap/1.7.2".into()),
            ..Default::default()
        };
        let pkt = packet(b"", Some(http));
        let det = SignatureMatcher::new().match_packet(&pkt).unwrap();
        assert_eq!(det.rule_id, "suspicious_scanner");
        assert_eq!(det.confidence, 0.7);
    }

    #[test]
    fn test_first_match_wins() {
        // Payload triggers both sql_injection and xss; rule order decides
        let pkt = packet(b"union select <script>alert(1)</script>", None);
        let det = SignatureMatcher::new().match_packet(&pkt).unwrap();
        assert_eq!(det.rule_id, "sql_injection");
    }

    #[test]
    fn test_clean_traffic() {
        let pkt = packet(b"GET /index.html HTTP/1.1", None);
        assert!(SignatureMatcher::new().match_packet(&pkt).is_none());
    }

    #[test]
    fn test_brute_force_rule_fires() {
        let pkt = packet(b"530 failed login attempt for admin", None);
        let det = SignatureMatcher::new().match_packet(&pkt).unwrap();
        assert_eq!(det.rule_id, SignatureMatcher::BRUTE_FORCE_ID);
    }
}
