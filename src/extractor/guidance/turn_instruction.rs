//! Turn instruction vocabulary shared by the annotator and the step builder.

use serde::Serialize;

/// What kind of maneuver a turn edge represents.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum TurnType {
    Invalid = 0,
    NewName,
    Continue,
    Turn,
    Merge,
    OnRamp,
    OffRamp,
    Fork,
    EndOfRoad,
    Notification,
    EnterRoundabout,
    EnterAndExitRoundabout,
    EnterRotary,
    EnterAndExitRotary,
    EnterRoundaboutIntersection,
    EnterAndExitRoundaboutIntersection,
    EnterRoundaboutAtExit,
    ExitRoundabout,
    EnterRotaryAtExit,
    ExitRotary,
    EnterRoundaboutIntersectionAtExit,
    ExitRoundaboutIntersection,
    StayOnRoundabout,
    Sliproad,
    Suppressed,
    NoTurn,
    UseLane,
}

/// Which way the maneuver points, counted on the turn circle.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum DirectionModifier {
    UTurn = 0,
    SharpRight,
    Right,
    SlightRight,
    Straight,
    SlightLeft,
    Left,
    SharpLeft,
}

impl DirectionModifier {
    /// Mirror a modifier across the straight axis (left <-> right).
    pub fn mirror(self) -> DirectionModifier {
        match self {
            DirectionModifier::UTurn => DirectionModifier::UTurn,
            DirectionModifier::SharpRight => DirectionModifier::SharpLeft,
            DirectionModifier::Right => DirectionModifier::Left,
            DirectionModifier::SlightRight => DirectionModifier::SlightLeft,
            DirectionModifier::Straight => DirectionModifier::Straight,
            DirectionModifier::SlightLeft => DirectionModifier::SlightRight,
            DirectionModifier::Left => DirectionModifier::Right,
            DirectionModifier::SharpLeft => DirectionModifier::SharpRight,
        }
    }

    pub fn text(self) -> &'static str {
        match self {
            DirectionModifier::UTurn => "uturn",
            DirectionModifier::SharpRight => "sharp right",
            DirectionModifier::Right => "right",
            DirectionModifier::SlightRight => "slight right",
            DirectionModifier::Straight => "straight",
            DirectionModifier::SlightLeft => "slight left",
            DirectionModifier::Left => "left",
            DirectionModifier::SharpLeft => "sharp left",
        }
    }
}

/// Angle windows used to derive a modifier from the turn angle (180 = straight).
pub fn direction_from_angle(angle: f64) -> DirectionModifier {
    let angle = angle % 360.0;
    if angle > 0.0 && angle < 60.0 {
        DirectionModifier::SharpRight
    } else if angle >= 60.0 && angle < 140.0 {
        DirectionModifier::Right
    } else if angle >= 140.0 && angle < 160.0 {
        DirectionModifier::SlightRight
    } else if angle >= 160.0 && angle <= 200.0 {
        DirectionModifier::Straight
    } else if angle > 200.0 && angle <= 220.0 {
        DirectionModifier::SlightLeft
    } else if angle > 220.0 && angle <= 300.0 {
        DirectionModifier::Left
    } else if angle > 300.0 && angle < 360.0 {
        DirectionModifier::SharpLeft
    } else {
        DirectionModifier::UTurn
    }
}

/// A `(type, modifier)` pair assigned to every turn edge at extraction time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TurnInstruction {
    pub turn_type: TurnType,
    pub direction_modifier: DirectionModifier,
}

impl TurnInstruction {
    pub const NO_TURN: TurnInstruction = TurnInstruction {
        turn_type: TurnType::NoTurn,
        direction_modifier: DirectionModifier::UTurn,
    };

    pub const INVALID: TurnInstruction = TurnInstruction {
        turn_type: TurnType::Invalid,
        direction_modifier: DirectionModifier::UTurn,
    };

    pub fn new(turn_type: TurnType, direction_modifier: DirectionModifier) -> Self {
        Self {
            turn_type,
            direction_modifier,
        }
    }

    pub fn suppressed(direction_modifier: DirectionModifier) -> Self {
        Self::new(TurnType::Suppressed, direction_modifier)
    }

    /// Type + angle-derived modifier.
    pub fn from_angle(turn_type: TurnType, angle: f64) -> Self {
        Self::new(turn_type, direction_from_angle(angle))
    }

    pub fn enters_roundabout(&self) -> bool {
        matches!(
            self.turn_type,
            TurnType::EnterRoundabout
                | TurnType::EnterAndExitRoundabout
                | TurnType::EnterRotary
                | TurnType::EnterAndExitRotary
                | TurnType::EnterRoundaboutIntersection
                | TurnType::EnterAndExitRoundaboutIntersection
                | TurnType::EnterRoundaboutAtExit
                | TurnType::EnterRotaryAtExit
                | TurnType::EnterRoundaboutIntersectionAtExit
        )
    }

    pub fn leaves_roundabout(&self) -> bool {
        matches!(
            self.turn_type,
            TurnType::EnterAndExitRoundabout
                | TurnType::EnterAndExitRotary
                | TurnType::EnterAndExitRoundaboutIntersection
                | TurnType::ExitRoundabout
                | TurnType::ExitRotary
                | TurnType::ExitRoundaboutIntersection
        )
    }

    pub fn stays_on_roundabout(&self) -> bool {
        matches!(self.turn_type, TurnType::StayOnRoundabout)
    }

    /// Silent instructions never surface as steps on their own.
    pub fn is_silent(&self) -> bool {
        matches!(
            self.turn_type,
            TurnType::NoTurn | TurnType::Suppressed | TurnType::StayOnRoundabout
        )
    }

    pub fn text(&self) -> &'static str {
        match self.turn_type {
            TurnType::Invalid => "invalid",
            TurnType::NewName => "new name",
            TurnType::Continue => "continue",
            TurnType::Turn => "turn",
            TurnType::Merge => "merge",
            TurnType::OnRamp => "on ramp",
            TurnType::OffRamp => "off ramp",
            TurnType::Fork => "fork",
            TurnType::EndOfRoad => "end of road",
            TurnType::Notification => "notification",
            TurnType::EnterRoundabout
            | TurnType::EnterAndExitRoundabout
            | TurnType::EnterRoundaboutAtExit => "roundabout",
            TurnType::EnterRotary | TurnType::EnterAndExitRotary | TurnType::EnterRotaryAtExit => {
                "rotary"
            }
            TurnType::EnterRoundaboutIntersection
            | TurnType::EnterAndExitRoundaboutIntersection
            | TurnType::EnterRoundaboutIntersectionAtExit => "roundabout turn",
            TurnType::ExitRoundabout => "exit roundabout",
            TurnType::ExitRotary => "exit rotary",
            TurnType::ExitRoundaboutIntersection => "exit roundabout",
            TurnType::StayOnRoundabout => "stay on roundabout",
            TurnType::Sliproad => "sliproad",
            TurnType::Suppressed => "suppressed",
            TurnType::NoTurn => "none",
            TurnType::UseLane => "use lane",
        }
    }

    /// Packed byte layout used by the `.osrm.edges` file: low 5 bits type,
    /// high 3 bits modifier.
    pub fn pack(&self) -> u8 {
        (self.turn_type as u8) | ((self.direction_modifier as u8) << 5)
    }

    pub fn unpack(byte: u8) -> Self {
        let turn_type = match byte & 0x1F {
            1 => TurnType::NewName,
            2 => TurnType::Continue,
            3 => TurnType::Turn,
            4 => TurnType::Merge,
            5 => TurnType::OnRamp,
            6 => TurnType::OffRamp,
            7 => TurnType::Fork,
            8 => TurnType::EndOfRoad,
            9 => TurnType::Notification,
            10 => TurnType::EnterRoundabout,
            11 => TurnType::EnterAndExitRoundabout,
            12 => TurnType::EnterRotary,
            13 => TurnType::EnterAndExitRotary,
            14 => TurnType::EnterRoundaboutIntersection,
            15 => TurnType::EnterAndExitRoundaboutIntersection,
            16 => TurnType::EnterRoundaboutAtExit,
            17 => TurnType::ExitRoundabout,
            18 => TurnType::EnterRotaryAtExit,
            19 => TurnType::ExitRotary,
            20 => TurnType::EnterRoundaboutIntersectionAtExit,
            21 => TurnType::ExitRoundaboutIntersection,
            22 => TurnType::StayOnRoundabout,
            23 => TurnType::Sliproad,
            24 => TurnType::Suppressed,
            25 => TurnType::NoTurn,
            26 => TurnType::UseLane,
            _ => TurnType::Invalid,
        };
        let direction_modifier = match (byte >> 5) & 0x07 {
            1 => DirectionModifier::SharpRight,
            2 => DirectionModifier::Right,
            3 => DirectionModifier::SlightRight,
            4 => DirectionModifier::Straight,
            5 => DirectionModifier::SlightLeft,
            6 => DirectionModifier::Left,
            7 => DirectionModifier::SharpLeft,
            _ => DirectionModifier::UTurn,
        };
        Self {
            turn_type,
            direction_modifier,
        }
    }
}
