//! Core types shared by the environments and the policy.
//!
//! Defines window positions, the four movement actions, and the composite
//! move-and-classify action of the glimpse environment.

use std::fmt;

use crate::env::EnvError;

/// One of the four window movements.
///
/// The discriminant is the action index exchanged with the policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Movement {
    Up = 0,
    Down = 1,
    Left = 2,
    Right = 3,
}

impl Movement {
    /// Number of movement actions.
    pub const COUNT: usize = 4;

    /// Returns all movements in index order.
    pub fn all() -> [Movement; 4] {
        [Movement::Up, Movement::Down, Movement::Left, Movement::Right]
    }

    /// Returns the action index of this movement.
    pub fn index(&self) -> usize {
        *self as usize
    }
}

impl TryFrom<usize> for Movement {
    type Error = EnvError;

    fn try_from(index: usize) -> Result<Self, Self::Error> {
        match index {
            0 => Ok(Movement::Up),
            1 => Ok(Movement::Down),
            2 => Ok(Movement::Left),
            3 => Ok(Movement::Right),
            other => Err(EnvError::InvalidAction {
                kind: "movement",
                index: other,
                limit: Self::COUNT,
            }),
        }
    }
}

impl fmt::Display for Movement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Movement::Up => write!(f, "up"),
            Movement::Down => write!(f, "down"),
            Movement::Left => write!(f, "left"),
            Movement::Right => write!(f, "right"),
        }
    }
}

/// Action of the glimpse environment: where to look next, and which label
/// the agent currently believes the image has.
///
/// Only the label submitted on the final step of an episode is scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GlimpseAction {
    pub movement: usize,
    pub label: usize,
}

impl GlimpseAction {
    /// Creates a new action from raw indices.
    pub fn new(movement: usize, label: usize) -> Self {
        Self { movement, label }
    }

    /// Decodes an action row produced by the policy head: column 0 is the
    /// movement index, the last column the classification index.
    ///
    /// Negative, non-integral or non-finite entries are rejected.
    pub fn from_row(row: &[f32]) -> Result<Self, EnvError> {
        let (first, last) = match (row.first(), row.last()) {
            (Some(first), Some(last)) if row.len() >= 2 => (*first, *last),
            _ => return Err(EnvError::MalformedAction(row.len())),
        };
        Ok(Self {
            movement: index_from_f32(first)?,
            label: index_from_f32(last)?,
        })
    }
}

/// Decoding of one row of a policy's action matrix into an environment action.
pub trait FromActionRow: Sized {
    fn from_action_row(row: &[f32]) -> Result<Self, EnvError>;
}

impl FromActionRow for GlimpseAction {
    fn from_action_row(row: &[f32]) -> Result<Self, EnvError> {
        Self::from_row(row)
    }
}

/// A bare movement index: the first column.
impl FromActionRow for usize {
    fn from_action_row(row: &[f32]) -> Result<Self, EnvError> {
        let first = row.first().ok_or(EnvError::MalformedAction(0))?;
        index_from_f32(*first)
    }
}

/// Converts an action entry encoded as a whole float into an index.
pub(crate) fn index_from_f32(value: f32) -> Result<usize, EnvError> {
    if value.is_finite() && value >= 0.0 && value.fract() == 0.0 {
        Ok(value as usize)
    } else {
        Err(EnvError::NonIntegralAction(value))
    }
}

/// Top-left corner of the window, in pixel coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub row: usize,
    pub col: usize,
}

impl Position {
    /// Creates a new position.
    pub fn new(row: usize, col: usize) -> Self {
        Self { row, col }
    }

    /// Clamps this position so that a `window × window` square starting here
    /// lies within a `height × width` image.
    pub fn clamp_to_bounds(&mut self, height: usize, width: usize, window: usize) {
        self.row = self.row.min(height.saturating_sub(window));
        self.col = self.col.min(width.saturating_sub(window));
    }

    /// Returns a new position clamped to the image bounds.
    pub fn clamped(mut self, height: usize, width: usize, window: usize) -> Self {
        self.clamp_to_bounds(height, width, window);
        self
    }

    /// Moves `stride` pixels in the given direction, then clamps.
    pub fn apply(
        &mut self,
        movement: Movement,
        stride: usize,
        height: usize,
        width: usize,
        window: usize,
    ) {
        match movement {
            Movement::Up => self.row = self.row.saturating_sub(stride),
            Movement::Down => self.row = self.row.saturating_add(stride),
            Movement::Left => self.col = self.col.saturating_sub(stride),
            Movement::Right => self.col = self.col.saturating_add(stride),
        }
        self.clamp_to_bounds(height, width, window);
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.row, self.col)
    }
}
