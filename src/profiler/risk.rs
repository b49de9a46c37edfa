use crate::{AttackerProfile, Severity};

/// Calcula el risk score de un perfil, acotado a [0,100]
///
/// Fórmula de compatibilidad, reproducida exactamente:
/// base `min(eventos * 10, 50)`, más `endpoints únicos * 2`, por 1.2 si la
/// sesión supera una hora, y el multiplicador de severidad aplicable más
/// alto (x2.0 con algún evento critical, si no x1.5 con algún high) - nunca
/// ambos, para no contar doble. Monótona en todos sus insumos.
pub fn score(profile: &AttackerProfile) -> f64 {
    let mut score = (profile.total_events as f64 * 10.0).min(50.0);
    score += profile.endpoints.len() as f64 * 2.0;

    if profile.session_duration() > chrono::Duration::hours(1) {
        score *= 1.2;
    }

    let severity_multiplier = if profile.max_severity >= Severity::Critical {
        2.0
    } else if profile.max_severity >= Severity::High {
        1.5
    } else {
        1.0
    };
    score *= severity_multiplier;

    score.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn profile(events: u64, endpoints: usize, max_severity: Severity) -> AttackerProfile {
        let now = Utc::now();
        let mut p = AttackerProfile::new("198.51.100.20", now);
        p.total_events = events;
        for i in 0..endpoints {
            p.endpoints.insert(format!("/endpoint/{}", i));
        }
        p.max_severity = max_severity;
        p
    }

    #[test]
    fn test_base_formula() {
        // 3 eventos, 2 endpoints, sin severidad alta ni sesión larga
        let p = profile(3, 2, Severity::Low);
        assert_eq!(score(&p), 34.0);
    }

    #[test]
    fn test_base_saturates_at_50() {
        let p = profile(1000, 0, Severity::Low);
        assert_eq!(score(&p), 50.0);
    }

    #[test]
    fn test_session_duration_multiplier() {
        let mut p = profile(2, 1, Severity::Low);
        p.last_seen = p.first_seen + Duration::hours(2);
        // (20 + 2) * 1.2
        assert!((score(&p) - 26.4).abs() < 1e-9);
    }

    #[test]
    fn test_critical_supersedes_high() {
        // Con critical presente solo aplica x2.0, nunca x1.5 encima
        let high = profile(2, 1, Severity::High);
        let critical = profile(2, 1, Severity::Critical);
        assert_eq!(score(&high), 33.0);
        assert_eq!(score(&critical), 44.0);
    }

    #[test]
    fn test_clipped_to_100() {
        let mut p = profile(100, 40, Severity::Critical);
        p.last_seen = p.first_seen + Duration::hours(3);
        assert_eq!(score(&p), 100.0);
    }

    #[test]
    fn test_monotone_in_event_count() {
        let mut previous = 0.0;
        for events in 0..50 {
            let s = score(&profile(events, 3, Severity::Medium));
            assert!(s >= previous);
            previous = s;
        }
    }

    #[test]
    fn test_monotone_in_unique_endpoints() {
        let mut previous = 0.0;
        for endpoints in 0..60 {
            let s = score(&profile(4, endpoints, Severity::Medium));
            assert!(s >= previous);
            previous = s;
        }
    }

    #[test]
    fn test_monotone_in_severity() {
        let severities = [
            Severity::Low,
            Severity::Medium,
            Severity::High,
            Severity::Critical,
        ];
        let mut previous = 0.0;
        for severity in severities {
            let s = score(&profile(4, 3, severity));
            assert!(s >= previous);
            previous = s;
        }
    }

    #[test]
    fn test_always_in_range() {
        for events in [0u64, 1, 10, 10_000] {
            for endpoints in [0usize, 5, 500] {
                let s = score(&profile(events, endpoints, Severity::Critical));
                assert!((0.0..=100.0).contains(&s));
            }
        }
    }
}
