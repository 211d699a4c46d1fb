//! Concurrency and edge case tests for the decision engine
//!
//! Covers the races a request-driven deployment hits:
//! - many first requests racing to create the trip's open round
//! - a participant resubmitting while readers snapshot the round
//! - result computation racing late ballots
//! - independent trips progressing in parallel

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tripvote::{
    Error, Result,
    config::EngineConfig,
    decision::{CandidateCatalog, DecisionService, RoundOutcome, SessionStatus, UndecidableReason},
    publish::{DecisionAuditTrail, DecisionEvent, DecisionEventSink, ResultPublisher},
    types::{Candidate, CandidateId, ParticipantId, TripId},
};

fn service_with_trips(
    trips: usize,
    candidates_per_trip: usize,
) -> (Arc<DecisionService>, Vec<(TripId, Vec<CandidateId>)>) {
    let catalog = Arc::new(CandidateCatalog::new());
    let mut setup = Vec::new();

    for _ in 0..trips {
        let trip_id = TripId::new();
        let candidates: Vec<Candidate> = (0..candidates_per_trip)
            .map(|i| Candidate::new(trip_id, format!("Destination {i}")))
            .collect();
        let ids = candidates.iter().map(|c| c.id).collect();
        catalog.publish(trip_id, candidates).unwrap();
        setup.push((trip_id, ids));
    }

    let service = DecisionService::new(EngineConfig::for_testing(), catalog, ResultPublisher::new());
    (Arc::new(service), setup)
}

// =============================================================================
// ROUND CREATION RACES
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_round_creation_yields_one_open_round() -> Result<()> {
    println!("🏁 Testing concurrent get_or_open_round...");

    let (service, trips) = service_with_trips(1, 3);
    let trip_id = trips[0].0;

    let mut handles = Vec::new();
    for _ in 0..32 {
        let service = service.clone();
        handles.push(tokio::spawn(async move { service.get_or_open_round(&trip_id) }));
    }

    let mut round_ids = HashSet::new();
    for handle in handles {
        let round = handle.await.unwrap()?;
        assert!(round.is_open());
        round_ids.insert(round.id);
    }

    assert_eq!(round_ids.len(), 1, "all callers must see the same round");
    assert_eq!(service.rounds(&trip_id)?.len(), 1);
    assert_eq!(service.stats()?.ledger.open_rounds, 1);

    println!(
        "✅ One open round; {} race retries absorbed",
        service.stats()?.race_retries
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_first_ballots_share_round() -> Result<()> {
    println!("🗳️ Testing simultaneous first ballots...");

    let (service, trips) = service_with_trips(1, 3);
    let (trip_id, ids) = trips[0].clone();

    let mut handles = Vec::new();
    for i in 0..24 {
        let service = service.clone();
        let ranking = vec![ids[i % ids.len()]];
        handles.push(tokio::spawn(async move {
            service.submit_ordered_ballot(&trip_id, &ParticipantId::new(), ranking)
        }));
    }

    let mut rounds = HashSet::new();
    for handle in handles {
        let receipt = handle.await.unwrap()?;
        assert!(receipt.replaced.is_none());
        rounds.insert(receipt.ballot.round_id);
    }

    assert_eq!(rounds.len(), 1);
    let round_id = *rounds.iter().next().unwrap();
    assert_eq!(service.ballots(&trip_id, &round_id)?.len(), 24);

    println!("✅ 24 ballots landed in a single round");
    Ok(())
}

// =============================================================================
// BALLOT REPLACEMENT ATOMICITY
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_replacement_never_shows_zero_or_two_ballots() -> Result<()> {
    println!("🔄 Testing atomic ballot replacement under readers...");

    let (service, trips) = service_with_trips(1, 4);
    let (trip_id, ids) = trips[0].clone();
    let voter = ParticipantId::new();

    let first = service.submit_ordered_ballot(&trip_id, &voter, vec![ids[0]])?;
    let round_id = first.ballot.round_id;

    let done = Arc::new(AtomicBool::new(false));
    let reads = Arc::new(AtomicUsize::new(0));

    let reader = {
        let service = service.clone();
        let done = done.clone();
        let reads = reads.clone();
        tokio::spawn(async move {
            while !done.load(Ordering::Acquire) {
                let ballots = service.ballots(&trip_id, &round_id).unwrap();
                let mine = ballots.iter().filter(|b| b.participant_id == voter).count();
                assert_eq!(mine, 1, "reader observed {mine} ballots for one participant");
                reads.fetch_add(1, Ordering::Relaxed);
                tokio::task::yield_now().await;
            }
        })
    };

    let mut writers = Vec::new();
    for w in 0..4 {
        let service = service.clone();
        let ids = ids.clone();
        writers.push(tokio::spawn(async move {
            for i in 0..50 {
                let mut ranking = ids.clone();
                ranking.rotate_left((w + i) % ids.len());
                let receipt = service
                    .submit_ordered_ballot(&trip_id, &voter, ranking)
                    .unwrap();
                assert!(receipt.replaced.is_some());
            }
        }));
    }

    for writer in writers {
        writer.await.unwrap();
    }
    done.store(true, Ordering::Release);
    reader.await.unwrap();

    assert_eq!(service.ballots(&trip_id, &round_id)?.len(), 1);
    let stats = service.stats()?;
    assert_eq!(stats.ballots_accepted, 201);
    assert_eq!(stats.ballots_replaced, 200);

    println!(
        "✅ {} consistent reads during 200 replacements",
        reads.load(Ordering::Relaxed)
    );
    Ok(())
}

// =============================================================================
// RESULT VS SUBMISSION RACE
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_late_ballots_are_counted_or_rejected_never_lost() -> Result<()> {
    println!("⏱️ Testing result computation racing submissions...");

    let (service, trips) = service_with_trips(1, 3);
    let (trip_id, ids) = trips[0].clone();
    let round = service.get_or_open_round(&trip_id)?;

    let mut submitters = Vec::new();
    for _ in 0..40 {
        let service = service.clone();
        // Unanimous rankings keep the outcome terminal whatever the snapshot holds
        let ranking = vec![ids[0], ids[1]];
        submitters.push(tokio::spawn(async move {
            tokio::task::yield_now().await;
            service.submit_ordered_ballot(&trip_id, &ParticipantId::new(), ranking)
        }));
    }

    let closer = {
        let service = service.clone();
        tokio::spawn(async move { service.compute_result(&trip_id) })
    };

    let mut accepted = HashSet::new();
    let mut closed_rejections = 0;
    for handle in submitters {
        match handle.await.unwrap() {
            Ok(receipt) => {
                assert_eq!(receipt.ballot.round_id, round.id);
                accepted.insert(receipt.ballot.id);
            }
            Err(Error::RoundClosed { round_id }) => {
                assert_eq!(round_id, round.id);
                closed_rejections += 1;
            }
            Err(e) => panic!("unexpected submission failure: {e}"),
        }
    }
    let result = closer.await.unwrap()?;

    let counted: HashSet<_> = service
        .ballots(&trip_id, &round.id)?
        .into_iter()
        .map(|b| b.id)
        .collect();
    assert_eq!(accepted, counted, "every accepted ballot is in the tallied snapshot");
    assert_eq!(result.ballots_counted, accepted.len());
    assert_eq!(accepted.len() + closed_rejections, 40);
    assert!(result.status.is_terminal());

    match result.outcome {
        RoundOutcome::Winner { candidate_id } => assert_eq!(candidate_id, ids[0]),
        RoundOutcome::Undecidable { .. } => assert!(accepted.is_empty()),
        RoundOutcome::Tied { .. } => panic!("unanimous ballots cannot tie"),
    }

    println!(
        "✅ {} counted, {} told to resubmit",
        accepted.len(),
        closed_rejections
    );
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_result_requests_close_once() -> Result<()> {
    println!("🔒 Testing concurrent compute_result calls...");

    let (service, trips) = service_with_trips(1, 2);
    let (trip_id, ids) = trips[0].clone();
    service.submit_ordered_ballot(&trip_id, &ParticipantId::new(), vec![ids[1]])?;

    let mut handles = Vec::new();
    for _ in 0..8 {
        let service = service.clone();
        handles.push(tokio::spawn(async move { service.compute_result(&trip_id) }));
    }

    let mut fresh = 0;
    for handle in handles {
        let result = handle.await.unwrap()?;
        assert_eq!(result.outcome.winner(), Some(ids[1]));
        if !result.already_decided {
            fresh += 1;
        }
    }

    assert_eq!(fresh, 1, "only one request performs the close");
    assert_eq!(service.stats()?.rounds_closed, 1);
    Ok(())
}

// =============================================================================
// EVENT ORDERING
// =============================================================================

/// Sink that stalls on Round 1 events and records what it receives
struct StallingSink {
    stalled: AtomicBool,
    delay: Duration,
    rounds_seen: Mutex<Vec<u32>>,
}

impl DecisionEventSink for StallingSink {
    fn name(&self) -> &str {
        "stalling"
    }

    fn accept(&self, event: &DecisionEvent) -> Result<()> {
        if event.round_number == 1 {
            self.stalled.store(true, Ordering::Release);
            std::thread::sleep(self.delay);
        }
        self.rounds_seen.lock().unwrap().push(event.round_number);
        Ok(())
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_sinks_receive_closes_in_round_order() -> Result<()> {
    println!("📬 Testing event order with a slow sink...");

    let trip_id = TripId::new();
    let catalog = Arc::new(CandidateCatalog::new());
    let candidates: Vec<Candidate> = ["Phuket", "Bali", "Koh Samui"]
        .iter()
        .map(|t| Candidate::new(trip_id, *t))
        .collect();
    let (p, b, k) = (candidates[0].id, candidates[1].id, candidates[2].id);
    catalog.publish(trip_id, candidates)?;

    let stalling = Arc::new(StallingSink {
        stalled: AtomicBool::new(false),
        delay: Duration::from_millis(300),
        rounds_seen: Mutex::new(Vec::new()),
    });
    let audit = Arc::new(DecisionAuditTrail::for_testing());
    let service = Arc::new(DecisionService::new(
        EngineConfig::for_testing(),
        catalog,
        ResultPublisher::new()
            .with_sink(stalling.clone())
            .with_sink(audit.clone()),
    ));

    // Round 1 ties P/B and opens a runoff
    service.submit_ordered_ballot(&trip_id, &ParticipantId::new(), vec![p, k, b])?;
    service.submit_ordered_ballot(&trip_id, &ParticipantId::new(), vec![b, k, p])?;

    let first = {
        let service = service.clone();
        tokio::task::spawn_blocking(move || service.compute_result(&trip_id))
    };
    while !stalling.stalled.load(Ordering::Acquire) {
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    // The runoff close is requested while Round 1's event is still being delivered
    let second = {
        let service = service.clone();
        tokio::task::spawn_blocking(move || service.compute_result(&trip_id))
    };

    let first = first.await.unwrap()?;
    let second = second.await.unwrap()?;
    assert_eq!(first.round.number, 1);
    assert!(first.next_round.is_some());
    assert_eq!(second.round.number, 2);
    assert_eq!(
        second.outcome,
        RoundOutcome::Undecidable {
            reason: UndecidableReason::NoBallotsCast
        }
    );

    assert_eq!(*stalling.rounds_seen.lock().unwrap(), vec![1, 2]);

    let records = audit.records_for_trip(&trip_id)?;
    let audited: Vec<(u64, u32)> = records
        .iter()
        .map(|r| (r.sequence_number, r.event.round_number))
        .collect();
    assert_eq!(audited, vec![(1, 1), (2, 2)]);
    assert!(audit.verify_integrity()?.is_valid());

    println!("✅ Sinks saw Round 1 before Round 2");
    Ok(())
}

// =============================================================================
// INDEPENDENT TRIPS
// =============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_trips_progress_independently() -> Result<()> {
    println!("🌍 Testing parallel sessions across trips...");

    let (service, trips) = service_with_trips(10, 3);

    let mut handles = Vec::new();
    for (n, (trip_id, ids)) in trips.clone().into_iter().enumerate() {
        let service = service.clone();
        handles.push(tokio::spawn(async move {
            let favourite = ids[n % ids.len()];
            for _ in 0..3 {
                service.submit_ordered_ballot(&trip_id, &ParticipantId::new(), vec![favourite])?;
            }
            service.compute_result(&trip_id).map(|r| (favourite, r))
        }));
    }

    for handle in handles {
        let (favourite, result) = handle.await.unwrap()?;
        assert_eq!(result.status, SessionStatus::Decided { winner: favourite });
    }

    let stats = service.stats()?;
    assert_eq!(stats.ledger.trips, 10);
    assert_eq!(stats.ledger.closed_rounds, 10);
    assert_eq!(stats.ledger.open_rounds, 0);
    assert_eq!(stats.ledger.stored_ballots, 30);

    // A candidate from one trip is never valid in another
    let trip_a = trips[0].0;
    let ids_b = &trips[1].1;
    let err = service
        .submit_ordered_ballot(&trip_a, &ParticipantId::new(), vec![ids_b[0]])
        .unwrap_err();
    assert!(matches!(err, Error::RoundClosed { .. } | Error::InvalidBallot { .. }));

    println!("✅ 10 trips decided in parallel");
    Ok(())
}

#[tokio::test]
async fn test_cross_trip_candidate_rejected_while_open() -> Result<()> {
    let (service, trips) = service_with_trips(2, 2);
    let trip_a = trips[0].0;
    let ids_b = &trips[1].1;

    let err = service
        .submit_ordered_ballot(&trip_a, &ParticipantId::new(), vec![ids_b[0]])
        .unwrap_err();
    assert!(matches!(err, Error::InvalidBallot { .. }));
    Ok(())
}

#[test]
fn test_race_errors_are_retryable() {
    let err = Error::RoundRaceLost {
        trip_id: TripId::new(),
    };
    assert!(err.is_retryable());
    assert!(err.to_string().contains("race"));
}
