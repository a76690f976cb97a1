use std::sync::{Arc, Mutex};

use ibex_core::{sign, Address, Block, Hash, KeyPair, Preprepare, Subject, View};
use ibex_storage::MemoryStorage;
use tokio::sync::{broadcast, mpsc};

use super::Core;
use crate::backend::{Backend, StorageStore, Transport};
use crate::config::Config;
use crate::engine::{inbox, EventReceiver};
use crate::error::ConsensusError;
use crate::events::{Event, InternalEvent};
use crate::local::MemoryChain;
use crate::messages::{Message, MessageCode, Payload};
use crate::state::State;
use crate::validator::Validator;

#[derive(Default)]
struct RecordingTransport {
    sent: Mutex<Vec<Vec<u8>>>,
}

impl RecordingTransport {
    fn messages(&self) -> Vec<Message> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .map(|bytes| Message::decode(bytes).unwrap())
            .collect()
    }

    fn count(&self, code: MessageCode) -> usize {
        self.messages().iter().filter(|m| m.code == code).count()
    }
}

impl Transport for RecordingTransport {
    fn send(&self, _target: &Address, payload: Vec<u8>) -> Result<(), ConsensusError> {
        self.sent.lock().unwrap().push(payload);
        Ok(())
    }

    fn broadcast(&self, _targets: &[Address], payload: Vec<u8>) -> Result<(), ConsensusError> {
        self.send(&Address::ZERO, payload)
    }
}

struct Harness {
    core: Core,
    keys: Vec<KeyPair>,
    genesis: Block,
    chain: Arc<MemoryChain>,
    transport: Arc<RecordingTransport>,
    internal: mpsc::UnboundedReceiver<InternalEvent>,
    events: EventReceiver,
    committed: broadcast::Receiver<Block>,
}

impl Harness {
    /// Four validators sorted by address; the core runs as validator `me`
    fn new(me: usize) -> Self {
        let mut keys: Vec<KeyPair> = (0..4).map(|_| KeyPair::generate()).collect();
        keys.sort_by_key(|k| k.address);
        let validators: Vec<Validator> = keys.iter().map(|k| Validator::new(k.public)).collect();

        let genesis = Block::genesis(0);
        let (tx, events) = inbox();
        let chain = Arc::new(MemoryChain::new(genesis.clone(), validators, tx));
        let transport = Arc::new(RecordingTransport::default());
        let backend = Backend::new(
            keys[me].clone(),
            transport.clone(),
            Arc::new(StorageStore::new(MemoryStorage::new())),
            chain.clone(),
        );

        let (internal_tx, internal) = mpsc::unbounded_channel();
        let (committed_tx, committed) = broadcast::channel(16);
        let mut core = Core::new(Config::default(), backend, internal_tx, committed_tx);
        core.start();

        Harness {
            core,
            keys,
            genesis,
            chain,
            transport,
            internal,
            events,
            committed,
        }
    }

    fn signed(&self, from: usize, payload: Payload) -> Vec<u8> {
        let kp = &self.keys[from];
        let mut message = Message::new(payload.code(), payload.encode().unwrap(), kp.address);
        message.signature = sign(&kp.secret, &message.payload_for_signing().unwrap());
        message.encode().unwrap()
    }

    fn deliver(&mut self, from: usize, payload: Payload) -> Result<(), ConsensusError> {
        let bytes = self.signed(from, payload);
        self.core.handle_message(&bytes)
    }

    /// Process self-posted events until none are left
    fn drain_internal(&mut self) {
        while let Ok(event) = self.internal.try_recv() {
            self.core.handle_internal(event);
        }
    }

    fn proposal(&self) -> Block {
        Block::new(1, self.genesis.hash(), 0, self.keys[0].address, b"txs".to_vec())
    }

    fn round_change(&self, round: u64) -> Payload {
        Payload::RoundChange(Subject {
            view: View::new(1, round),
            digest: Hash::ZERO,
        })
    }

    /// Deliver the proposer's preprepare for sequence 1 and let the core
    /// vote on it
    fn accept_proposal(&mut self) -> Subject {
        let proposal = self.proposal();
        let subject = Subject {
            view: View::new(1, 0),
            digest: proposal.hash(),
        };
        self.deliver(0, Payload::Preprepare(Preprepare::new(View::new(1, 0), proposal)))
            .unwrap();
        self.drain_internal();
        subject
    }

    /// Take the sequence 1 proposal through prepare and commit quorums with
    /// votes from validators 0 and 2
    fn commit_proposal(&mut self) -> Subject {
        let subject = self.accept_proposal();
        self.deliver(0, Payload::Prepare(subject)).unwrap();
        self.deliver(2, Payload::Prepare(subject)).unwrap();
        self.drain_internal();
        self.deliver(0, Payload::Commit(subject)).unwrap();
        self.deliver(2, Payload::Commit(subject)).unwrap();
        subject
    }

    /// Prepare the sequence 1 proposal, then let validators 0, 1 and 2 move
    /// everyone to round 1, where validator 1 proposes
    fn lock_and_move_to_round_one(&mut self) -> Subject {
        let subject = self.accept_proposal();
        self.deliver(0, Payload::Prepare(subject)).unwrap();
        self.deliver(1, Payload::Prepare(subject)).unwrap();
        self.drain_internal();
        assert!(self.core.current.is_locked());

        for from in 0..3 {
            self.deliver(from, self.round_change(1)).unwrap();
        }
        assert_eq!(self.core.current.view(), View::new(1, 1));
        assert_eq!(self.core.state, State::AcceptRequest);
        subject
    }

    fn finalize(&mut self) {
        let Ok(Event::FinalCommitted(block)) = self.events.try_recv() else {
            panic!("expected final committed event");
        };
        self.core.handle_event(Event::FinalCommitted(block));
    }

    fn last_subject(&self, code: MessageCode) -> Subject {
        let message = self
            .transport
            .messages()
            .into_iter()
            .rev()
            .find(|m| m.code == code)
            .unwrap();
        match message.decode_payload().unwrap() {
            Payload::Prepare(s) | Payload::Commit(s) | Payload::Checkpoint(s) | Payload::RoundChange(s) => s,
            Payload::Preprepare(_) => panic!("preprepare has no subject"),
        }
    }
}

#[tokio::test]
async fn test_weak_certificate_catches_up_at_f_plus_one() {
    let mut h = Harness::new(0);

    h.deliver(1, h.round_change(1)).unwrap();
    assert_eq!(h.core.current.view(), View::new(1, 0));
    assert!(!h.core.waiting_for_round_change);
    assert_eq!(h.transport.count(MessageCode::RoundChange), 0);

    // F + 1 = 2
    h.deliver(2, h.round_change(1)).unwrap();
    assert_eq!(h.core.current.view(), View::new(1, 1));
    assert!(h.core.waiting_for_round_change);
    assert_eq!(h.transport.count(MessageCode::RoundChange), 1);
}

#[tokio::test]
async fn test_strong_certificate_starts_round_at_two_f_plus_one() {
    let mut h = Harness::new(0);

    h.deliver(1, h.round_change(1)).unwrap();
    h.deliver(2, h.round_change(1)).unwrap();
    assert!(h.core.waiting_for_round_change);

    // 2F + 1 = 3, own vote still queued
    h.deliver(3, h.round_change(1)).unwrap();
    assert!(!h.core.waiting_for_round_change);
    assert_eq!(h.core.state, State::AcceptRequest);
    assert_eq!(h.core.current.view(), View::new(1, 1));
    assert!(h.core.validators.is_proposer(&h.keys[1].address));

    // The fourth vote changes nothing
    h.drain_internal();
    assert_eq!(h.core.current.view(), View::new(1, 1));
    assert!(!h.core.waiting_for_round_change);
}

#[tokio::test]
async fn test_round_change_for_current_round_does_not_catch_up() {
    let mut h = Harness::new(0);

    for from in 1..4 {
        h.deliver(from, h.round_change(0)).unwrap();
    }
    assert_eq!(h.core.current.view(), View::new(1, 0));
    assert!(!h.core.waiting_for_round_change);
    assert_eq!(h.transport.count(MessageCode::RoundChange), 0);
}

#[tokio::test]
async fn test_round_change_for_other_sequence() {
    let mut h = Harness::new(0);

    let future = Payload::RoundChange(Subject {
        view: View::new(5, 0),
        digest: Hash::ZERO,
    });
    assert!(matches!(h.deliver(1, future), Err(ConsensusError::FutureMessage)));
    assert_eq!(h.core.backlog.len(), 1);

    let old = Payload::RoundChange(Subject {
        view: View::new(0, 3),
        digest: Hash::ZERO,
    });
    assert!(matches!(
        h.deliver(1, old),
        Err(ConsensusError::InvalidRoundChange { current: 1, got: 0 })
    ));
}

#[tokio::test]
async fn test_preprepare_validation() {
    let mut h = Harness::new(1);
    let proposal = h.proposal();

    let from_peer = Payload::Preprepare(Preprepare::new(View::new(1, 0), proposal.clone()));
    assert!(matches!(h.deliver(2, from_peer), Err(ConsensusError::NotFromProposer)));

    let nil = Payload::Preprepare(Preprepare {
        view: View::new(1, 0),
        proposal: None,
    });
    assert!(matches!(h.deliver(0, nil), Err(ConsensusError::NilProposal)));

    let future = Payload::Preprepare(Preprepare::new(View::new(2, 0), proposal));
    assert!(matches!(h.deliver(0, future), Err(ConsensusError::FutureMessage)));
    assert_eq!(h.core.backlog.len(), 1);
    assert_eq!(h.core.state, State::AcceptRequest);
}

#[tokio::test]
async fn test_unknown_sender_is_rejected() {
    let mut h = Harness::new(1);
    let outsider = KeyPair::generate();
    let payload = h.round_change(1);

    let mut message = Message::new(payload.code(), payload.encode().unwrap(), outsider.address);
    message.signature = sign(&outsider.secret, &message.payload_for_signing().unwrap());
    let result = h.core.handle_message(&message.encode().unwrap());
    assert!(matches!(result, Err(ConsensusError::NoMatchingValidator(a)) if a == outsider.address));
}

#[tokio::test]
async fn test_prepare_before_preprepare_is_future() {
    let mut h = Harness::new(1);
    let subject = Subject {
        view: View::new(1, 0),
        digest: h.proposal().hash(),
    };

    assert!(matches!(h.deliver(2, Payload::Prepare(subject)), Err(ConsensusError::FutureMessage)));
    assert_eq!(h.core.backlog.len(), 1);

    // Replayed once the preprepare is accepted
    h.accept_proposal();
    assert!(h.core.backlog.is_empty());
    assert_eq!(h.core.current.prepares.size(), 2);
}

#[tokio::test]
async fn test_mismatched_subject_is_dropped() {
    let mut h = Harness::new(1);
    h.accept_proposal();
    assert_eq!(h.core.state, State::Preprepared);

    let wrong = Subject {
        view: View::new(1, 0),
        digest: Hash::new([9u8; 32]),
    };
    assert!(matches!(h.deliver(2, Payload::Prepare(wrong)), Err(ConsensusError::SubjectNotMatched)));
    assert!(h.core.backlog.is_empty());
}

#[tokio::test]
async fn test_quorum_commits_exactly_once() {
    let mut h = Harness::new(1);
    let subject = h.accept_proposal();
    assert_eq!(h.transport.count(MessageCode::Prepare), 1);

    h.deliver(0, Payload::Prepare(subject)).unwrap();
    assert_eq!(h.core.state, State::Preprepared);
    h.deliver(2, Payload::Prepare(subject)).unwrap();
    assert_eq!(h.core.state, State::Prepared);
    assert_eq!(h.core.current.locked_hash(), Some(subject.digest));
    assert_eq!(h.transport.count(MessageCode::Commit), 1);
    h.drain_internal();

    h.deliver(0, Payload::Commit(subject)).unwrap();
    h.deliver(2, Payload::Commit(subject)).unwrap();
    assert_eq!(h.core.state, State::Committed);
    assert_eq!(h.chain.height(), 1);

    // Late commit does not commit again
    h.deliver(3, Payload::Commit(subject)).unwrap();
    assert_eq!(h.chain.height(), 1);
    assert_eq!(h.committed.try_recv().unwrap().hash(), subject.digest);
    assert!(h.committed.try_recv().is_err());

    // The chain reports back; the next sequence starts
    let Ok(Event::FinalCommitted(block)) = h.events.try_recv() else {
        panic!("expected final committed event");
    };
    h.core.handle_event(Event::FinalCommitted(block));
    assert_eq!(h.core.current.view(), View::new(2, 0));
    assert_eq!(h.core.state, State::AcceptRequest);
    assert_eq!(h.core.checkpoints.len(), 1);
    assert_eq!(h.transport.count(MessageCode::Checkpoint), 1);
}

#[tokio::test]
async fn test_commit_failure_discards_and_changes_round() {
    let mut h = Harness::new(1);
    h.chain.reject_next_commits(1);
    let subject = h.accept_proposal();

    h.deliver(0, Payload::Prepare(subject)).unwrap();
    h.deliver(2, Payload::Prepare(subject)).unwrap();
    h.drain_internal();
    h.deliver(0, Payload::Commit(subject)).unwrap();
    h.deliver(2, Payload::Commit(subject)).unwrap();

    assert_eq!(h.chain.height(), 0);
    assert_eq!(h.core.current.view(), View::new(1, 1));
    assert!(h.core.waiting_for_round_change);
    assert!(!h.core.current.is_locked());
    assert!(h.core.current.preprepare.is_none());
    assert_eq!(h.transport.count(MessageCode::RoundChange), 1);
}

#[tokio::test]
async fn test_locked_proposal_is_reproposed() {
    // Validator 1 proposes round 1 after the genesis proposer
    let mut h = Harness::new(1);
    let subject = h.accept_proposal();
    h.deliver(0, Payload::Prepare(subject)).unwrap();
    h.deliver(2, Payload::Prepare(subject)).unwrap();
    assert!(h.core.current.is_locked());
    h.drain_internal();

    for from in [0, 2, 3] {
        h.deliver(from, h.round_change(1)).unwrap();
    }
    assert_eq!(h.core.current.view(), View::new(1, 1));
    assert!(h.core.validators.is_proposer(&h.keys[1].address));

    let preprepares: Vec<Message> = h
        .transport
        .messages()
        .into_iter()
        .filter(|m| m.code == MessageCode::Preprepare)
        .collect();
    assert_eq!(preprepares.len(), 1);
    let Payload::Preprepare(preprepare) = preprepares[0].decode_payload().unwrap() else {
        panic!("expected preprepare");
    };
    assert_eq!(preprepare.view, View::new(1, 1));
    assert_eq!(preprepare.proposal.unwrap().hash(), subject.digest);
}

#[tokio::test]
async fn test_requests_by_sequence() {
    let mut h = Harness::new(0);

    let future = Block::new(3, Hash::ZERO, 0, h.keys[0].address, vec![]);
    h.core.handle_request(future).unwrap();
    assert_eq!(h.core.pending_requests.len(), 1);

    let old = Block::new(0, Hash::ZERO, 0, h.keys[0].address, vec![]);
    assert!(matches!(h.core.handle_request(old), Err(ConsensusError::OldMessage)));

    // Validator 0 proposes sequence 1 after genesis
    let proposal = h.proposal();
    h.core.handle_request(proposal).unwrap();
    assert_eq!(h.transport.count(MessageCode::Preprepare), 1);
    h.drain_internal();
    assert_eq!(h.core.state, State::Preprepared);
}

#[tokio::test]
async fn test_stale_timeout_is_ignored() {
    let mut h = Harness::new(0);

    h.core.handle_internal(InternalEvent::Timeout(View::new(0, 0)));
    assert_eq!(h.core.current.view(), View::new(1, 0));

    h.core.handle_internal(InternalEvent::Timeout(View::new(1, 0)));
    assert_eq!(h.core.current.view(), View::new(1, 1));
    assert!(h.core.waiting_for_round_change);
}

#[tokio::test]
async fn test_locked_replica_refuses_other_proposal() {
    let mut h = Harness::new(3);
    let locked = h.lock_and_move_to_round_one();
    let round_changes = h.transport.count(MessageCode::RoundChange);

    let other = Block::new(1, h.genesis.hash(), 0, h.keys[1].address, b"other".to_vec());
    h.deliver(1, Payload::Preprepare(Preprepare::new(View::new(1, 1), other)))
        .unwrap();

    assert_eq!(h.transport.count(MessageCode::RoundChange), round_changes + 1);
    assert_eq!(h.last_subject(MessageCode::RoundChange).view, View::new(1, 2));
    assert_eq!(h.core.current.view(), View::new(1, 2));
    assert!(h.core.waiting_for_round_change);
    assert_eq!(h.core.current.locked_hash(), Some(locked.digest));
}

#[tokio::test]
async fn test_locked_replica_commits_locked_proposal() {
    let mut h = Harness::new(3);
    let locked = h.lock_and_move_to_round_one();
    assert_eq!(h.transport.count(MessageCode::Prepare), 1);
    assert_eq!(h.transport.count(MessageCode::Commit), 1);

    let proposal = h.proposal();
    h.deliver(1, Payload::Preprepare(Preprepare::new(View::new(1, 1), proposal)))
        .unwrap();

    // Straight to prepared, no second prepare
    assert_eq!(h.core.state, State::Prepared);
    assert_eq!(h.transport.count(MessageCode::Prepare), 1);
    assert_eq!(h.transport.count(MessageCode::Commit), 2);
    let commit = h.last_subject(MessageCode::Commit);
    assert_eq!(commit.view, View::new(1, 1));
    assert_eq!(commit.digest, locked.digest);
}

#[tokio::test]
async fn test_unverifiable_proposal_changes_round() {
    let mut h = Harness::new(1);
    let orphan = Block::new(1, Hash::ZERO, 0, h.keys[0].address, b"txs".to_vec());

    let result = h.deliver(0, Payload::Preprepare(Preprepare::new(View::new(1, 0), orphan)));
    assert!(matches!(result, Err(ConsensusError::InvalidProposal(_))));
    assert_eq!(h.transport.count(MessageCode::Prepare), 0);
    assert_eq!(h.transport.count(MessageCode::RoundChange), 1);
    assert_eq!(h.core.current.view(), View::new(1, 1));
    assert!(h.core.waiting_for_round_change);
}

#[tokio::test]
async fn test_resent_preprepare_after_commit_is_ignored() {
    let mut h = Harness::new(1);
    h.commit_proposal();
    assert_eq!(h.core.state, State::Committed);

    // The head has moved, so the proposal would no longer verify
    let proposal = h.proposal();
    h.deliver(0, Payload::Preprepare(Preprepare::new(View::new(1, 0), proposal)))
        .unwrap();

    assert_eq!(h.transport.count(MessageCode::RoundChange), 0);
    assert_eq!(h.core.current.view(), View::new(1, 0));
    assert_eq!(h.core.state, State::Committed);
}

#[tokio::test]
async fn test_checkpoint_before_preprepare_is_replayed() {
    let mut h = Harness::new(1);
    let subject = Subject {
        view: View::new(1, 0),
        digest: h.proposal().hash(),
    };

    assert!(matches!(h.deliver(2, Payload::Checkpoint(subject)), Err(ConsensusError::FutureMessage)));
    assert_eq!(h.core.backlog.len(), 1);

    h.accept_proposal();
    assert!(h.core.backlog.is_empty());
    assert_eq!(h.core.current.checkpoints.size(), 1);

    let wrong = Subject {
        view: View::new(1, 0),
        digest: Hash::new([9u8; 32]),
    };
    assert!(matches!(h.deliver(3, Payload::Checkpoint(wrong)), Err(ConsensusError::SubjectNotMatched)));
    assert_eq!(h.core.current.checkpoints.size(), 1);
}

#[tokio::test]
async fn test_checkpoint_votes_reach_archived_snapshot() {
    let mut h = Harness::new(1);
    let subject = h.commit_proposal();
    h.finalize();
    assert_eq!(h.core.current.view(), View::new(2, 0));

    // Our own checkpoint comes back through the loopback
    h.drain_internal();
    h.deliver(0, Payload::Checkpoint(subject)).unwrap();
    h.deliver(2, Payload::Checkpoint(subject)).unwrap();

    assert_eq!(h.core.checkpoints.archived_mut(0).unwrap().checkpoints.size(), 3);
    assert_eq!(h.core.current.checkpoints.size(), 0);

    let wrong = Subject {
        view: View::new(1, 0),
        digest: Hash::new([9u8; 32]),
    };
    assert!(matches!(h.deliver(3, Payload::Checkpoint(wrong)), Err(ConsensusError::SubjectNotMatched)));

    let unknown = Subject {
        view: View::new(0, 0),
        digest: h.genesis.hash(),
    };
    assert!(matches!(h.deliver(3, Payload::Checkpoint(unknown)), Err(ConsensusError::InvalidMessage)));
}

#[tokio::test]
async fn test_timeout_before_final_commit_archives_committed_round() {
    let mut h = Harness::new(1);
    let subject = h.commit_proposal();
    assert_eq!(h.core.state, State::Committed);

    h.core.handle_internal(InternalEvent::Timeout(View::new(1, 0)));
    assert_eq!(h.core.current.view(), View::new(1, 1));

    h.finalize();
    assert_eq!(h.core.current.view(), View::new(2, 0));
    assert_eq!(h.core.checkpoints.len(), 1);

    let archived = h.core.checkpoints.archived_mut(0).unwrap();
    assert_eq!(archived.view(), View::new(1, 0));
    assert_eq!(archived.commits.size(), 3);

    let checkpoint = h.last_subject(MessageCode::Checkpoint);
    assert_eq!(checkpoint.view, subject.view);
    assert_eq!(checkpoint.digest, subject.digest);
}
