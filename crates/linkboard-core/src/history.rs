//! Per-client undo/redo over board entities.
//!
//! Each step holds one or more entity records captured before a local
//! mutation. Undo and redo reinstate records through the [`Board`] so the
//! result can be broadcast like any other edit.
//!
//! Remote edits are not part of the local history. When a remote update lands
//! on an entity after a record for it was captured, that record is stale:
//! replaying it would silently discard the remote edit, so the whole step is
//! rejected instead and reported as [`HistoryOutcome::Conflict`].

use crate::board::Board;
use crate::shapes::{Connector, ConnectorId, EntityId, EntityKind, Shape};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Default number of undo steps kept.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Kind of mutation a record reverses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HistoryAction {
    Add,
    Update,
    Delete,
}

/// Full state of one entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "entity_type", content = "entity", rename_all = "snake_case")]
pub enum EntitySnapshot {
    Shape(Shape),
    Connector(Connector),
}

impl EntitySnapshot {
    pub fn id(&self) -> EntityId {
        match self {
            EntitySnapshot::Shape(s) => EntityId::Shape(s.id()),
            EntitySnapshot::Connector(c) => EntityId::Connector(c.id()),
        }
    }

    pub fn kind(&self) -> EntityKind {
        self.id().kind()
    }

    pub fn is_deleted(&self) -> bool {
        match self {
            EntitySnapshot::Shape(s) => s.is_deleted(),
            EntitySnapshot::Connector(c) => c.is_deleted(),
        }
    }

    pub fn with_deleted(&self, deleted: bool) -> Self {
        match self {
            EntitySnapshot::Shape(s) => EntitySnapshot::Shape(s.with_deleted(deleted)),
            EntitySnapshot::Connector(c) => EntitySnapshot::Connector(c.with_deleted(deleted)),
        }
    }
}

/// One reversible entity mutation.
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryRecord {
    pub action: HistoryAction,
    pub snapshot: EntitySnapshot,
    /// Logical time the record was captured.
    stamp: u64,
}

impl HistoryRecord {
    pub fn entity(&self) -> EntityId {
        self.snapshot.id()
    }
}

/// Result of an undo or redo request.
#[derive(Debug, Clone, PartialEq)]
pub enum HistoryOutcome {
    /// Nothing to replay.
    Empty,
    /// The step was applied. `entities` changed directly, `cascaded`
    /// connectors moved because a shape they are bound to changed.
    Applied {
        entities: Vec<EntityId>,
        cascaded: Vec<ConnectorId>,
    },
    /// The step targeted an entity modified remotely after it was recorded.
    /// The step was dropped and the board left untouched.
    Conflict(EntityId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Direction {
    Undo,
    Redo,
}

/// Undo and redo stacks for one client session.
#[derive(Debug, Clone)]
pub struct HistoryManager {
    undo_stack: Vec<Vec<HistoryRecord>>,
    redo_stack: Vec<Vec<HistoryRecord>>,
    max_history: usize,
    clock: u64,
    /// Logical time of the latest remote change per entity.
    remote_marks: HashMap<EntityId, u64>,
}

impl HistoryManager {
    pub fn new(max_history: usize) -> Self {
        Self {
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            max_history: max_history.max(1),
            clock: 0,
            remote_marks: HashMap::new(),
        }
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    /// Record a local mutation of one entity. `before` is the entity's state
    /// before the change (for `Add`, the added entity).
    pub fn record_mutation(&mut self, action: HistoryAction, before: EntitySnapshot) {
        self.record_step(vec![(action, before)]);
    }

    /// Record several entity mutations that undo and redo together.
    ///
    /// A new local mutation diverges from any undone future, so the redo
    /// stack is cleared.
    pub fn record_step(&mut self, records: Vec<(HistoryAction, EntitySnapshot)>) {
        if records.is_empty() {
            return;
        }
        let stamp = self.tick();
        let step = records
            .into_iter()
            .map(|(action, snapshot)| HistoryRecord { action, snapshot, stamp })
            .collect();
        self.undo_stack.push(step);
        self.redo_stack.clear();
        while self.undo_stack.len() > self.max_history {
            self.undo_stack.remove(0);
        }
    }

    /// Note that a remote update changed `entity`.
    pub fn note_remote_change(&mut self, entity: EntityId) {
        let stamp = self.tick();
        self.remote_marks.insert(entity, stamp);
    }

    pub fn undo(&mut self, board: &mut Board) -> HistoryOutcome {
        self.replay(board, Direction::Undo)
    }

    pub fn redo(&mut self, board: &mut Board) -> HistoryOutcome {
        self.replay(board, Direction::Redo)
    }

    fn replay(&mut self, board: &mut Board, direction: Direction) -> HistoryOutcome {
        let popped = match direction {
            Direction::Undo => self.undo_stack.pop(),
            Direction::Redo => self.redo_stack.pop(),
        };
        let Some(step) = popped else {
            return HistoryOutcome::Empty;
        };

        if let Some(stale) = step.iter().find(|r| self.is_stale(r)) {
            let entity = stale.entity();
            log::warn!("Dropping {:?} step: {} was changed remotely", direction, entity);
            return HistoryOutcome::Conflict(entity);
        }

        let stamp = self.tick();
        // Capture every current state before the board changes under us.
        let mut records: Vec<(HistoryRecord, EntitySnapshot)> = step
            .into_iter()
            .rev()
            .map(|record| {
                let current = board
                    .snapshot_of(record.entity())
                    .unwrap_or_else(|| record.snapshot.clone());
                (record, current)
            })
            .collect();
        // Shapes first: restoring a shape re-attaches its connectors, which
        // the step's connector records then overwrite exactly.
        records.sort_by_key(|(record, _)| record.snapshot.kind() == EntityKind::Connector);

        let mut entities = Vec::with_capacity(records.len());
        let mut cascaded = Vec::new();
        let mut inverse = Vec::with_capacity(records.len());
        for (record, current) in records {
            let entity = record.entity();
            let target = match (direction, record.action) {
                (Direction::Undo, HistoryAction::Add) | (Direction::Redo, HistoryAction::Delete) => {
                    current.with_deleted(true)
                }
                (Direction::Undo, HistoryAction::Delete) | (Direction::Redo, HistoryAction::Add) => {
                    record.snapshot.with_deleted(false)
                }
                (_, HistoryAction::Update) => record.snapshot,
            };
            cascaded.extend(board.restore(target));
            entities.push(entity);
            inverse.push(HistoryRecord {
                action: record.action,
                snapshot: current,
                stamp,
            });
        }
        inverse.reverse();
        let mut seen = HashSet::new();
        cascaded.retain(|id| !entities.contains(&EntityId::Connector(*id)) && seen.insert(*id));

        match direction {
            Direction::Undo => self.redo_stack.push(inverse),
            Direction::Redo => self.undo_stack.push(inverse),
        }
        HistoryOutcome::Applied { entities, cascaded }
    }

    fn is_stale(&self, record: &HistoryRecord) -> bool {
        self.remote_marks
            .get(&record.entity())
            .is_some_and(|&mark| mark > record.stamp)
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo_count(&self) -> usize {
        self.undo_stack.len()
    }

    pub fn redo_count(&self) -> usize {
        self.redo_stack.len()
    }

    /// Clear all history.
    pub fn clear(&mut self) {
        self.undo_stack.clear();
        self.redo_stack.clear();
        self.remote_marks.clear();
    }
}

impl Default for HistoryManager {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}
