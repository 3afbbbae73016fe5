//! Per-entity path buffer.
//!
//! Destinations are decomposed into unit waypoints by decrementing both axes
//! toward zero at the same time, so a leg like (+5, +2) becomes two diagonal
//! steps followed by three straight ones. Clients expect exactly this
//! ordering; do not replace it with a line-drawing algorithm.

use std::collections::VecDeque;

use crate::position::{Direction, Position, Viewport};

/// Longest path a queue will hold.
pub const MAX_PATH_LENGTH: usize = 50;

/// Run energy ceiling.
pub const MAX_RUN_ENERGY: u8 = 100;

/// One queued waypoint. `direction` is `None` only for the reset marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Point {
    pub x: i32,
    pub y: i32,
    pub direction: Option<Direction>,
}

/// What a call to [`WalkingQueue::process`] did, for the owner to act on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProcessOutcome {
    /// Running was switched off because energy ran out this tick.
    pub run_exhausted: bool,
    /// The entity is near the edge of its last viewport.
    pub needs_rebuild: bool,
}

#[derive(Debug, Clone)]
pub struct WalkingQueue {
    points: VecDeque<Point>,
    walking_direction: Option<Direction>,
    running_direction: Option<Direction>,
    running: bool,
    /// `None` for entities that never tire.
    energy: Option<u8>,
}

impl WalkingQueue {
    /// Queue for an entity that spends energy while running.
    pub fn with_energy(energy: u8) -> Self {
        Self {
            energy: Some(energy.min(MAX_RUN_ENERGY)),
            ..Self::tireless()
        }
    }

    /// Queue for an entity that can run indefinitely.
    pub fn tireless() -> Self {
        Self {
            points: VecDeque::with_capacity(MAX_PATH_LENGTH),
            walking_direction: None,
            running_direction: None,
            running: false,
            energy: None,
        }
    }

    /// Clears the path, leaving a marker on the current tile.
    pub fn reset(&mut self, current: &Position) {
        self.points.clear();
        self.points.push_back(Point {
            x: current.x,
            y: current.y,
            direction: None,
        });
    }

    /// Drops the head of the queue, normally the marker left by [`reset`].
    ///
    /// [`reset`]: WalkingQueue::reset
    pub fn finish(&mut self) {
        self.points.pop_front();
    }

    /// Appends unit waypoints from the tail of the queue toward `(x, y)`.
    pub fn step(&mut self, current: &Position, x: i32, y: i32) {
        let Some(last) = self.tail_or_reset(current) else {
            return;
        };
        let mut dx = x - last.x;
        let mut dy = y - last.y;

        let steps = dx.abs().max(dy.abs());
        for _ in 0..steps {
            dx -= dx.signum();
            dy -= dy.signum();
            if self.points.len() < MAX_PATH_LENGTH {
                self.push(x - dx, y - dy);
            }
        }
    }

    fn tail_or_reset(&mut self, current: &Position) -> Option<Point> {
        if self.points.is_empty() {
            self.reset(current);
        }
        self.points.back().copied()
    }

    fn push(&mut self, x: i32, y: i32) {
        let Some(last) = self.points.back() else {
            return;
        };
        if let Some(direction) = Direction::from_delta(x - last.x, y - last.y) {
            self.points.push_back(Point {
                x,
                y,
                direction: Some(direction),
            });
        }
    }

    /// Pops the head point and moves `position` one tile along it.
    pub fn next(&mut self, position: &mut Position) -> Option<Point> {
        let point = self.points.pop_front()?;
        let direction = point.direction?;
        *position = position.step(direction);
        Some(point)
    }

    /// Advances the entity by one tick.
    ///
    /// `halted` covers both a teleport landing this tick and a movement lock;
    /// either way the directions are cleared and the path is dropped.
    /// `region` is the position the client's current viewport was built
    /// around.
    pub fn process(
        &mut self,
        position: &mut Position,
        region: &Position,
        halted: bool,
    ) -> ProcessOutcome {
        let mut outcome = ProcessOutcome::default();
        if halted {
            self.walking_direction = None;
            self.running_direction = None;
            self.reset(position);
            return outcome;
        }

        let walking = self.next(position);
        let mut running = None;
        if self.running {
            match self.energy {
                Some(0) => {
                    self.running = false;
                    outcome.run_exhausted = true;
                }
                Some(energy) => {
                    running = self.next(position);
                    if running.is_some() {
                        self.energy = Some(energy - 1);
                    }
                }
                None => running = self.next(position),
            }
        }

        self.walking_direction = walking.and_then(|p| p.direction);
        self.running_direction = running.and_then(|p| p.direction);

        outcome.needs_rebuild = Viewport::new(region).needs_rebuild(position);
        outcome
    }

    pub fn walking_direction(&self) -> Option<Direction> {
        self.walking_direction
    }

    pub fn running_direction(&self) -> Option<Direction> {
        self.running_direction
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn set_running(&mut self, running: bool) {
        self.running = running;
    }

    pub fn energy(&self) -> Option<u8> {
        self.energy
    }

    /// Adds energy up to the ceiling. No effect on tireless queues.
    pub fn restore_energy(&mut self, amount: u8) {
        if let Some(energy) = self.energy.as_mut() {
            *energy = energy.saturating_add(amount).min(MAX_RUN_ENERGY);
        }
    }

    pub fn set_energy(&mut self, energy: u8) {
        if self.energy.is_some() {
            self.energy = Some(energy.min(MAX_RUN_ENERGY));
        }
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn points(&self) -> impl Iterator<Item = &Point> {
        self.points.iter()
    }
}
