use chrono::Duration;
use once_cell::sync::Lazy;
use std::sync::Arc;

use crate::config::{keys, SecurityConfig};
use crate::error::Result;
use crate::models::{
    SecurityAlert, SecurityEvent, SecurityEventType, SecurityThreat, Severity, ThreatType,
};
use crate::security::ip_registry::IpBlockRegistry;
use crate::store::{SecurityEventStore, ThreatStore};

// User-agent substrings that identify crawlers and CLI tools
static BOT_SIGNATURES: Lazy<Vec<&'static str>> = Lazy::new(|| {
    vec![
        "bot", "crawler", "spider", "scraper", "curl", "wget", "python-requests",
        "go-http-client", "scrapy", "httpclient", "headless", "phantomjs",
    ]
});

/// Classifies security events into threats and triggers mitigation
///
/// Checks are not mutually exclusive: one event can produce several threats.
/// Every detected threat gets a derived alert for human triage; brute-force
/// and bot threats additionally auto-block the source IP.
#[derive(Clone)]
pub struct ThreatDetector {
    events: Arc<dyn SecurityEventStore>,
    threats: Arc<dyn ThreatStore>,
    ip_registry: IpBlockRegistry,
    config: Arc<SecurityConfig>,
}

impl ThreatDetector {
    pub fn new(
        events: Arc<dyn SecurityEventStore>,
        threats: Arc<dyn ThreatStore>,
        ip_registry: IpBlockRegistry,
        config: Arc<SecurityConfig>,
    ) -> Self {
        Self {
            events,
            threats,
            ip_registry,
            config,
        }
    }

    /// Record the event, run every check, persist what fired and mitigate
    pub async fn process_event(&self, event: SecurityEvent) -> Result<Vec<SecurityThreat>> {
        self.events.record_event(event.clone()).await?;

        let mut detected = Vec::new();

        if event.event_type == SecurityEventType::FailedLogin {
            if let Some(threat) = self.check_brute_force(&event).await? {
                detected.push(threat);
            }
        }

        if event.event_type == SecurityEventType::SuspiciousActivity {
            detected.push(SecurityThreat::new(
                ThreatType::SuspiciousActivity,
                Severity::Medium,
                &event.ip_address,
                format!("Suspicious activity reported from {}", event.ip_address),
            ));
        }

        if is_bot_agent(&event.user_agent) {
            detected.push(SecurityThreat::new(
                ThreatType::Bot,
                Severity::Medium,
                &event.ip_address,
                format!("Automated client detected: {}", event.user_agent),
            ));
        }

        for threat in &detected {
            self.threats.insert_threat(threat.clone()).await?;
            self.threats.insert_alert(SecurityAlert::for_threat(threat)).await?;
            metrics::counter!("security_threats_total", 1);

            self.mitigate(threat).await?;
        }

        Ok(detected)
    }

    async fn check_brute_force(&self, event: &SecurityEvent) -> Result<Option<SecurityThreat>> {
        let limit = self.config.get_u64(keys::THREAT_FAILED_LOGIN_LIMIT, 5);
        let window_secs = self.config.get_u64(keys::THREAT_FAILED_LOGIN_WINDOW_SECS, 900);

        let since = event.created_at - Duration::seconds(window_secs as i64);
        let count = self
            .events
            .count_events(&event.ip_address, SecurityEventType::FailedLogin, since)
            .await?;

        if count > limit {
            return Ok(Some(SecurityThreat::new(
                ThreatType::BruteForce,
                Severity::High,
                &event.ip_address,
                format!(
                    "{} failed logins from {} within {} seconds",
                    count, event.ip_address, window_secs
                ),
            )));
        }
        Ok(None)
    }

    async fn mitigate(&self, threat: &SecurityThreat) -> Result<()> {
        match threat.threat_type {
            ThreatType::BruteForce | ThreatType::Bot => {
                self.ip_registry
                    .block(&threat.source, &threat.description, None)
                    .await?;
            }
            _ => {
                // No automatic mitigation; a human works the alert
                tracing::info!(
                    threat_type = ?threat.threat_type,
                    source = %threat.source,
                    "threat recorded for manual review"
                );
            }
        }
        Ok(())
    }
}

/// True when the user agent matches a known bot or CLI-tool signature
pub fn is_bot_agent(user_agent: &str) -> bool {
    let lower = user_agent.to_lowercase();
    BOT_SIGNATURES.iter().any(|sig| lower.contains(sig))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ThreatStatus;
    use crate::store::{MemoryStore, ThreatFilter};

    const BROWSER_UA: &str = "Mozilla/5.0 (X11; Linux x86_64) Gecko/20100101 Firefox/118.0";

    fn detector(store: Arc<MemoryStore>) -> ThreatDetector {
        ThreatDetector::new(
            store.clone(),
            store.clone(),
            IpBlockRegistry::new(store),
            Arc::new(SecurityConfig::new()),
        )
    }

    #[tokio::test]
    async fn test_brute_force_detection_and_block() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());

        let mut all_threats = Vec::new();
        for _ in 0..6 {
            let event = SecurityEvent::new(
                "10.0.0.1",
                BROWSER_UA,
                SecurityEventType::FailedLogin,
                Severity::Medium,
            );
            all_threats.extend(detector.process_event(event).await.unwrap());
        }

        // Only the sixth event crosses the threshold
        assert_eq!(all_threats.len(), 1);
        assert_eq!(all_threats[0].threat_type, ThreatType::BruteForce);
        assert_eq!(all_threats[0].severity, Severity::High);
        assert_eq!(all_threats[0].status, ThreatStatus::Active);

        let registry = IpBlockRegistry::new(store.clone());
        assert!(registry.is_blocked("10.0.0.1").await.unwrap());

        // A matching alert exists for the threat
        let alerts = crate::store::ThreatStore::list_alerts(store.as_ref(), None)
            .await
            .unwrap();
        assert_eq!(alerts.len(), 1);
        assert_eq!(alerts[0].threat_id, all_threats[0].id);
    }

    #[tokio::test]
    async fn test_failed_logins_under_limit_are_quiet() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());

        for _ in 0..5 {
            let event = SecurityEvent::new(
                "10.0.0.2",
                BROWSER_UA,
                SecurityEventType::FailedLogin,
                Severity::Medium,
            );
            assert!(detector.process_event(event).await.unwrap().is_empty());
        }

        let registry = IpBlockRegistry::new(store);
        assert!(!registry.is_blocked("10.0.0.2").await.unwrap());
    }

    #[tokio::test]
    async fn test_suspicious_activity_always_fires_without_block() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());

        let event = SecurityEvent::new(
            "10.0.0.3",
            BROWSER_UA,
            SecurityEventType::SuspiciousActivity,
            Severity::Medium,
        );
        let threats = detector.process_event(event).await.unwrap();

        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].threat_type, ThreatType::SuspiciousActivity);
        assert_eq!(threats[0].severity, Severity::Medium);

        // Logged for manual review only; no automatic mitigation
        let registry = IpBlockRegistry::new(store);
        assert!(!registry.is_blocked("10.0.0.3").await.unwrap());
    }

    #[tokio::test]
    async fn test_bot_user_agent_blocks_ip() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());

        let event = SecurityEvent::new(
            "10.0.0.4",
            "python-requests/2.31",
            SecurityEventType::ContentCreation,
            Severity::Low,
        );
        let threats = detector.process_event(event).await.unwrap();

        assert_eq!(threats.len(), 1);
        assert_eq!(threats[0].threat_type, ThreatType::Bot);

        let registry = IpBlockRegistry::new(store);
        assert!(registry.is_blocked("10.0.0.4").await.unwrap());
    }

    #[tokio::test]
    async fn test_checks_are_not_mutually_exclusive() {
        let store = Arc::new(MemoryStore::new());
        let detector = detector(store.clone());

        // Suspicious activity reported by a crawler: both checks fire
        let event = SecurityEvent::new(
            "10.0.0.5",
            "Googlebot/2.1",
            SecurityEventType::SuspiciousActivity,
            Severity::Medium,
        );
        let threats = detector.process_event(event).await.unwrap();

        let kinds: Vec<ThreatType> = threats.iter().map(|t| t.threat_type).collect();
        assert!(kinds.contains(&ThreatType::SuspiciousActivity));
        assert!(kinds.contains(&ThreatType::Bot));

        let stored = crate::store::ThreatStore::list_threats(store.as_ref(), &ThreatFilter::default())
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
    }

    #[test]
    fn test_bot_agent_signatures() {
        assert!(is_bot_agent("curl/8.4.0"));
        assert!(is_bot_agent("Mozilla/5.0 (compatible; AhrefsBot/7.0)"));
        assert!(is_bot_agent("Scrapy/2.11"));
        assert!(!is_bot_agent(BROWSER_UA));
    }
}
