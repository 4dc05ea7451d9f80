//! Line classifiers for qmail multilog output.
//!
//! Each function recognises one log family and returns `None` for anything
//! it does not understand. Lines may carry a multilog TAI64N prefix
//! (`@4000000063a1b2c30f1e2d3c `), which is stripped first.

/// Outcome of one `delivery N:` line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryResult {
    Success,
    Failure,
    Deferral,
}

/// Events recognised in the qmail-send log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SendEvent {
    NewMsg,
    EndMsg,
    Bounce,
    Delivery(DeliveryResult),
    /// `status: local a/b remote c/d`, busy slots only.
    Status { local: i64, remote: i64 },
}

/// Events recognised in the tcpserver/qmail-smtpd log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SmtpEvent {
    /// `tcpserver: ok`, connection accepted.
    Accepted,
    /// `tcpserver: deny`, connection refused by rules.
    Denied,
    /// `tcpserver: end N status S`.
    End { status: i32 },
    /// `tcpserver: status: a/b`, busy connections.
    Status { busy: i64 },
    RateLimit(RateLimitEvent),
}

/// Results reported by the ratelimitspp SMTP plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitEvent {
    ConnTimeout,
    Error,
    Ratelimited,
}

const RATELIMITSPP_MARKER: &str = "ratelimitspp:";
const RATELIMITSPP_ERROR: &str = "Error:";
const RATELIMITSPP_TIMEOUT: &str = "Receiving data failed, connection timed out.";
const RATELIMITSPP_NOK: &str = ";Result:NOK";

/// Removes a leading `@<hex>` multilog timestamp.
pub fn strip_timestamp(line: &str) -> &str {
    match line.strip_prefix('@') {
        Some(rest) => match rest.split_once(' ') {
            Some((stamp, msg)) if stamp.bytes().all(|b| b.is_ascii_hexdigit()) => msg,
            _ => line,
        },
        None => line,
    }
}

/// Busy count from an `a/b` pair.
fn busy_slots(pair: &str) -> Option<i64> {
    pair.split_once('/')?.0.trim().parse().ok()
}

pub fn parse_send_line(line: &str) -> Option<SendEvent> {
    let msg = strip_timestamp(line);

    if msg.starts_with("new msg ") {
        return Some(SendEvent::NewMsg);
    }
    if msg.starts_with("end msg ") {
        return Some(SendEvent::EndMsg);
    }
    if msg.starts_with("bounce msg ") {
        return Some(SendEvent::Bounce);
    }

    if let Some(rest) = msg.strip_prefix("delivery ") {
        let (_, outcome) = rest.split_once(": ")?;
        let result = if outcome.starts_with("success") {
            DeliveryResult::Success
        } else if outcome.starts_with("failure") {
            DeliveryResult::Failure
        } else if outcome.starts_with("deferral") {
            DeliveryResult::Deferral
        } else {
            return None;
        };
        return Some(SendEvent::Delivery(result));
    }

    if let Some(rest) = msg.strip_prefix("status: ") {
        // status: local 0/10 remote 2/20
        let mut local = None;
        let mut remote = None;
        let mut words = rest.split_whitespace();
        while let Some(word) = words.next() {
            match word {
                "local" => local = words.next().and_then(busy_slots),
                "remote" => remote = words.next().and_then(busy_slots),
                _ => {}
            }
        }
        return Some(SendEvent::Status {
            local: local?,
            remote: remote?,
        });
    }

    None
}

pub fn parse_smtp_line(line: &str) -> Option<SmtpEvent> {
    if let Some(event) = parse_ratelimitspp(line) {
        return Some(SmtpEvent::RateLimit(event));
    }

    let msg = strip_timestamp(line);
    let rest = msg.strip_prefix("tcpserver: ")?;

    if let Some(pair) = rest.strip_prefix("status: ") {
        return busy_slots(pair).map(|busy| SmtpEvent::Status { busy });
    }
    if rest.starts_with("ok ") {
        return Some(SmtpEvent::Accepted);
    }
    if rest.starts_with("deny ") {
        return Some(SmtpEvent::Denied);
    }
    if let Some(end) = rest.strip_prefix("end ") {
        // end 1234 status 256
        let (_, status) = end.split_once(" status ")?;
        let status = status.split_whitespace().next()?.parse().ok()?;
        return Some(SmtpEvent::End { status });
    }

    None
}

/// Classifies a ratelimitspp plugin line.
///
/// An `Error:` after the marker is a timeout when it carries the receive
/// timeout text and a generic error otherwise; without `Error:`, a
/// `;Result:NOK` verdict means the sender was rate limited.
pub fn parse_ratelimitspp(line: &str) -> Option<RateLimitEvent> {
    let start = line.find(RATELIMITSPP_MARKER)?;
    let rest = &line[start..];

    if let Some(err) = rest.find(RATELIMITSPP_ERROR) {
        if rest[err..].contains(RATELIMITSPP_TIMEOUT) {
            return Some(RateLimitEvent::ConnTimeout);
        }
        return Some(RateLimitEvent::Error);
    }

    rest.contains(RATELIMITSPP_NOK).then_some(RateLimitEvent::Ratelimited)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_timestamp() {
        assert_eq!(
            strip_timestamp("@400000006553f1a90b2c3d4e new msg 42"),
            "new msg 42"
        );
        assert_eq!(strip_timestamp("new msg 42"), "new msg 42");
        assert_eq!(strip_timestamp("@home is where"), "@home is where");
        assert_eq!(strip_timestamp("@4000"), "@4000");
    }

    #[test]
    fn test_send_messages() {
        assert_eq!(
            parse_send_line("@400000006553f1a90b2c3d4e new msg 393218"),
            Some(SendEvent::NewMsg)
        );
        assert_eq!(parse_send_line("end msg 393218"), Some(SendEvent::EndMsg));
        assert_eq!(
            parse_send_line("bounce msg 393218 qp 1234"),
            Some(SendEvent::Bounce)
        );
    }

    #[test]
    fn test_send_deliveries() {
        assert_eq!(
            parse_send_line("delivery 12: success: did_0+0+1/"),
            Some(SendEvent::Delivery(DeliveryResult::Success))
        );
        assert_eq!(
            parse_send_line("delivery 13: failure: Sorry,_no_mailbox_here_by_that_name._(#5.1.1)/"),
            Some(SendEvent::Delivery(DeliveryResult::Failure))
        );
        assert_eq!(
            parse_send_line("delivery 14: deferral: Connected_to_10.0.0.1_but_connection_died./"),
            Some(SendEvent::Delivery(DeliveryResult::Deferral))
        );
        assert_eq!(parse_send_line("delivery 15: something: odd"), None);
        assert_eq!(parse_send_line("delivery 15"), None);
    }

    #[test]
    fn test_send_status() {
        assert_eq!(
            parse_send_line("status: local 1/10 remote 7/20"),
            Some(SendEvent::Status {
                local: 1,
                remote: 7
            })
        );
        assert_eq!(parse_send_line("status: local 1/10"), None);
        assert_eq!(parse_send_line("status: local x/10 remote 1/20"), None);
    }

    #[test]
    fn test_send_ignores_other_lines() {
        assert_eq!(
            parse_send_line("info msg 393218: bytes 2339 from <a@example.com> qp 1 uid 0"),
            None
        );
        assert_eq!(
            parse_send_line("starting delivery 12: msg 393218 to remote b@example.com"),
            None
        );
        assert_eq!(parse_send_line(""), None);
    }

    #[test]
    fn test_smtp_tcpserver_lines() {
        assert_eq!(
            parse_smtp_line("@400000006553f1a90b2c3d4e tcpserver: status: 3/40"),
            Some(SmtpEvent::Status { busy: 3 })
        );
        assert_eq!(
            parse_smtp_line("tcpserver: ok 2231 mx.example.com:10.0.0.1:25 :10.0.0.9::51234"),
            Some(SmtpEvent::Accepted)
        );
        assert_eq!(
            parse_smtp_line("tcpserver: deny 2232 0:10.0.0.1:25 :10.0.0.66::4412"),
            Some(SmtpEvent::Denied)
        );
        assert_eq!(
            parse_smtp_line("tcpserver: end 2231 status 0"),
            Some(SmtpEvent::End { status: 0 })
        );
        assert_eq!(
            parse_smtp_line("tcpserver: end 2233 status 256"),
            Some(SmtpEvent::End { status: 256 })
        );
        assert_eq!(parse_smtp_line("tcpserver: pid 2231 from 10.0.0.9"), None);
        assert_eq!(parse_smtp_line("qmail-smtpd: something"), None);
    }

    #[test]
    fn test_ratelimitspp_timeout() {
        assert_eq!(
            parse_ratelimitspp(
                "ratelimitspp: pid 77 Error: Receiving data failed, connection timed out."
            ),
            Some(RateLimitEvent::ConnTimeout)
        );
    }

    #[test]
    fn test_ratelimitspp_other_error() {
        assert_eq!(
            parse_ratelimitspp("ratelimitspp: pid 77 Error: cannot connect to table server"),
            Some(RateLimitEvent::Error)
        );
    }

    #[test]
    fn test_ratelimitspp_nok() {
        assert_eq!(
            parse_ratelimitspp("@4000 ratelimitspp: 10.0.0.9;a@example.com;Result:NOK"),
            Some(RateLimitEvent::Ratelimited)
        );
        assert_eq!(
            parse_ratelimitspp("ratelimitspp: 10.0.0.9;a@example.com;Result:OK"),
            None
        );
    }

    #[test]
    fn test_ratelimitspp_requires_marker() {
        assert_eq!(parse_ratelimitspp("Error: Receiving data failed"), None);
        assert_eq!(parse_ratelimitspp(";Result:NOK"), None);
    }

    #[test]
    fn test_smtp_routes_ratelimitspp() {
        assert_eq!(
            parse_smtp_line("ratelimitspp: 10.0.0.9;x@example.com;Result:NOK"),
            Some(SmtpEvent::RateLimit(RateLimitEvent::Ratelimited))
        );
    }
}
