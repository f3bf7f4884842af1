use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use sigline::frame::packet_capacity;
use sigline::link::MemoryLink;
use sigline::signal::{
    start_as_initiator, start_as_responder, CandidateCallback, EngineError, IceCandidate,
    MediaEngine, Role, SessionDescription, SessionState, SignalConfig, SignalError,
};
use tokio::time::Instant;
use tracing::{info, warn};

use crate::cmd::{parse_duration, LoopbackArgs};
use crate::exit::{frame_error, io_error, kind_code, signal_error, CliResult, SUCCESS};
use crate::output::{print_json, table, OutputFormat};

/// A media engine that fabricates plausible descriptions and host candidates.
struct SyntheticEngine {
    session_id: u64,
    candidate_count: usize,
    sink: Mutex<Option<CandidateCallback>>,
    remote: Mutex<Option<SessionDescription>>,
    applied_candidates: AtomicUsize,
}

impl SyntheticEngine {
    fn new(session_id: u64, candidate_count: usize) -> Self {
        Self {
            session_id,
            candidate_count,
            sink: Mutex::new(None),
            remote: Mutex::new(None),
            applied_candidates: AtomicUsize::new(0),
        }
    }

    fn sdp(&self, setup: &str) -> String {
        format!(
            "v=0\r\no=- {} 2 IN IP4 127.0.0.1\r\ns=-\r\nt=0 0\r\na=group:BUNDLE 0\r\n\
             m=application 9 UDP/DTLS/SCTP webrtc-datachannel\r\nc=IN IP4 0.0.0.0\r\n\
             a=mid:0\r\na=setup:{setup}\r\na=sctp-port:5000\r\n",
            self.session_id
        )
    }

    fn trickle(&self) {
        let sink = self.sink.lock();
        let Some(sink) = sink.as_ref() else {
            return;
        };
        for n in 0..self.candidate_count {
            let host = (self.session_id % 200) as usize + n + 1;
            sink(IceCandidate::new(
                format!(
                    "candidate:{n} 1 udp 2122260223 192.0.2.{host} {} typ host",
                    50000 + n
                ),
                "0",
                0,
            ));
        }
    }

    fn applied_candidates(&self) -> usize {
        self.applied_candidates.load(Ordering::Acquire)
    }
}

#[async_trait]
impl MediaEngine for SyntheticEngine {
    async fn create_local_offer(&self) -> Result<SessionDescription, EngineError> {
        let offer = SessionDescription::offer(self.sdp("actpass"));
        self.trickle();
        Ok(offer)
    }

    async fn create_local_answer(&self) -> Result<SessionDescription, EngineError> {
        if self.remote.lock().is_none() {
            return Err(EngineError::new("no remote offer to answer"));
        }
        let answer = SessionDescription::answer(self.sdp("active"));
        self.trickle();
        Ok(answer)
    }

    async fn apply_remote_description(
        &self,
        description: SessionDescription,
    ) -> Result<(), EngineError> {
        if !description.sdp.starts_with("v=0") {
            return Err(EngineError::new("description is not SDP"));
        }
        *self.remote.lock() = Some(description);
        Ok(())
    }

    fn on_local_candidate(&self, callback: CandidateCallback) {
        *self.sink.lock() = Some(callback);
    }

    async fn apply_remote_candidate(&self, candidate: IceCandidate) -> Result<(), EngineError> {
        if !candidate.candidate.starts_with("candidate:") {
            return Err(EngineError::new("malformed candidate"));
        }
        self.applied_candidates.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }
}

#[derive(Serialize)]
struct SideReport {
    role: String,
    state: String,
    packets_sent: usize,
    bytes_sent: usize,
    remote_candidates_applied: usize,
    error: Option<String>,
}

#[derive(Serialize)]
struct LoopbackReport {
    unit_size: usize,
    candidates: usize,
    connected: bool,
    sides: Vec<SideReport>,
}

pub fn run(args: LoopbackArgs, format: OutputFormat) -> CliResult<i32> {
    let timeout = parse_duration(&args.answer_timeout)?;
    packet_capacity(args.unit_size).map_err(|err| frame_error("loopback", err))?;
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .map_err(|err| io_error("start runtime", err))?;

    let (report, failure) = runtime.block_on(exchange(args.unit_size, args.candidates, timeout))?;
    print_report(&report, format);

    Ok(match failure {
        Some(SessionState::Failed(kind)) => kind_code(kind),
        _ => SUCCESS,
    })
}

async fn exchange(
    unit_size: usize,
    candidates: usize,
    timeout: Duration,
) -> CliResult<(LoopbackReport, Option<SessionState>)> {
    let (left, right) = MemoryLink::pair(Some(unit_size));
    let (left, right) = (Arc::new(left), Arc::new(right));
    let config = SignalConfig {
        answer_timeout: timeout,
        offer_timeout: timeout,
        ..SignalConfig::default()
    };
    let offerer = Arc::new(SyntheticEngine::new(4_611_686_018, candidates));
    let answerer = Arc::new(SyntheticEngine::new(7_302_155_903, candidates));

    let responder = start_as_responder(Arc::clone(&right), Arc::clone(&answerer), config.clone())
        .map_err(|err| signal_error("start responder", err))?;
    let initiator = start_as_initiator(Arc::clone(&left), Arc::clone(&offerer), config)
        .map_err(|err| signal_error("start initiator", err))?;
    info!(unit_size, candidates, "loopback exchange started");

    let settled = async { tokio::join!(initiator.settled(), responder.settled()) };
    let states = tokio::select! {
        states = settled => states,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted");
            initiator.cancel();
            responder.cancel();
            (initiator.settled().await, responder.settled().await)
        }
    };
    let connected = states == (SessionState::Connected, SessionState::Connected);

    if connected {
        // Trickled candidates may still be in flight after both sides connect.
        let deadline = Instant::now().checked_add(timeout);
        while (offerer.applied_candidates() < candidates
            || answerer.applied_candidates() < candidates)
            && deadline.map_or(true, |deadline| Instant::now() < deadline)
        {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    let roles = (initiator.role(), responder.role());
    left.disconnect();
    let initiator_result = initiator.wait().await;
    let responder_result = responder.wait().await;

    let failure = [states.0, states.1]
        .into_iter()
        .find(|state| matches!(state, SessionState::Failed(_)));
    let report = LoopbackReport {
        unit_size,
        candidates,
        connected,
        sides: vec![
            side(roles.0, states.0, &left, &offerer, initiator_result),
            side(roles.1, states.1, &right, &answerer, responder_result),
        ],
    };
    Ok((report, failure))
}

fn side(
    role: Role,
    state: SessionState,
    link: &MemoryLink,
    engine: &SyntheticEngine,
    result: Result<(), SignalError>,
) -> SideReport {
    let written = link.written();
    SideReport {
        role: role.to_string(),
        state: state.to_string(),
        packets_sent: written.len(),
        bytes_sent: written.iter().map(|packet| packet.len()).sum(),
        remote_candidates_applied: engine.applied_candidates(),
        error: result.err().map(|err| err.to_string()),
    }
}

fn print_report(report: &LoopbackReport, format: OutputFormat) {
    match format {
        OutputFormat::Json => print_json(report),
        OutputFormat::Table => {
            let mut sides = table(["ROLE", "STATE", "PACKETS", "BYTES", "CANDIDATES", "ERROR"]);
            for side in &report.sides {
                sides.add_row(vec![
                    side.role.clone(),
                    side.state.clone(),
                    side.packets_sent.to_string(),
                    side.bytes_sent.to_string(),
                    side.remote_candidates_applied.to_string(),
                    side.error.clone().unwrap_or_default(),
                ]);
            }
            println!("{sides}");
        }
        OutputFormat::Pretty => {
            println!("Loopback (unit {}):", report.unit_size);
            for side in &report.sides {
                println!(
                    "  {:<10} {:<14} {} packets, {} candidates applied",
                    side.role, side.state, side.packets_sent, side.remote_candidates_applied
                );
                if let Some(err) = &side.error {
                    println!("             error: {err}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn loopback_connects_and_trickles() {
        let (report, failure) = exchange(20, 3, Duration::from_secs(5)).await.unwrap();

        assert!(report.connected);
        assert!(failure.is_none());
        for side in &report.sides {
            assert_eq!(side.state, "connected");
            assert_eq!(side.remote_candidates_applied, 3);
            assert!(side.error.is_none());
            assert!(side.packets_sent > 0);
        }
    }

    #[tokio::test]
    async fn unbounded_timeout_still_connects() {
        let (report, failure) = exchange(20, 1, Duration::MAX).await.unwrap();

        assert!(report.connected);
        assert!(failure.is_none());
        let roles: Vec<_> = report.sides.iter().map(|side| side.role.as_str()).collect();
        assert_eq!(roles, ["initiator", "responder"]);
        for side in &report.sides {
            assert_eq!(side.remote_candidates_applied, 1);
        }
    }

    #[tokio::test]
    async fn unit_too_small_fails_initiator() {
        let (report, failure) = exchange(4, 0, Duration::from_millis(100)).await.unwrap();

        assert!(!report.connected);
        assert!(matches!(failure, Some(SessionState::Failed(_))));
        assert_eq!(report.sides[0].packets_sent, 0);
    }
}
