//! Motor identity, position representation, and the geometry predicates
//! the Sequencer and Collision Sentinel both evaluate.

use crate::consts::{CLEARANCE_FIBER, CLEARANCE_PMASK, KMIRR_RADIUS};

/// One of the four linear stages under PCU control.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MotorId {
    M1 = 0,
    M2 = 1,
    M3 = 2,
    M4 = 3,
}

impl MotorId {
    pub const ALL: [MotorId; 4] = [MotorId::M1, MotorId::M2, MotorId::M3, MotorId::M4];

    #[must_use]
    pub fn from_u8(v: u8) -> Option<Self> {
        match v {
            0 => Some(MotorId::M1),
            1 => Some(MotorId::M2),
            2 => Some(MotorId::M3),
            3 => Some(MotorId::M4),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            MotorId::M1 => "m1",
            MotorId::M2 => "m2",
            MotorId::M3 => "m3",
            MotorId::M4 => "m4",
        }
    }
}

/// Which of the three configuration-document tables a named
/// configuration was declared in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigClass {
    Base,
    FiberVariant,
    MaskVariant,
}

/// Per-motor limits, tolerance, and nominal enablement as declared in
/// the `[motors.*]` tables of the configuration document.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MotorMeta {
    pub enabled: bool,
    pub limits: (f64, f64),
    pub tolerance: f64,
}

/// A position (full or partial) across the four motors.
///
/// `None` at a given index means that motor is absent or unconstrained
/// for this position — it takes no part in limit checks, clearance
/// checks, or move-completion checks.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    coords: [Option<f64>; 4],
}

impl Position {
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, m: MotorId) -> Option<f64> {
        self.coords[m as usize]
    }

    pub fn set(&mut self, m: MotorId, v: f64) {
        self.coords[m as usize] = Some(v);
    }

    pub fn with(mut self, m: MotorId, v: f64) -> Self {
        self.set(m, v);
        self
    }

    #[must_use]
    pub fn is_set(&self, m: MotorId) -> bool {
        self.coords[m as usize].is_some()
    }

    /// Motors set in this (possibly partial) position.
    pub fn set_motors(&self) -> impl Iterator<Item = MotorId> + '_ {
        MotorId::ALL.into_iter().filter(move |m| self.is_set(*m))
    }

    /// Within `tolerance` of `other` on every motor set in `other`.
    #[must_use]
    pub fn within(&self, other: &Position, tolerance: f64) -> bool {
        other.set_motors().all(|m| match (self.get(m), other.get(m)) {
            (Some(a), Some(b)) => (a - b).abs() < tolerance,
            _ => false,
        })
    }

    /// Like [`Position::within`], but using each motor's own declared
    /// tolerance from `metas` rather than one shared value.
    #[must_use]
    pub fn within_tolerances(&self, other: &Position, metas: &[(MotorId, MotorMeta)]) -> bool {
        other.set_motors().all(|m| {
            let Some((_, meta)) = metas.iter().find(|(id, _)| *id == m) else {
                return false;
            };
            match (self.get(m), other.get(m)) {
                (Some(a), Some(b)) => (a - b).abs() < meta.tolerance,
                _ => false,
            }
        })
    }

    /// `true` if m3 and m4 (where present) are both above `HOME`,
    /// i.e. the named position is not the pair's retracted state.
    fn extended(&self, m: MotorId) -> bool {
        self.get(m).is_some_and(|v| v > crate::consts::HOME)
    }

    /// Pinhole mask deploy axis (m3) is extended into the beam.
    #[must_use]
    pub fn mask_extended(&self) -> bool {
        self.extended(MotorId::M3)
    }

    /// Fiber bundle deploy axis (m4) is extended into the beam.
    #[must_use]
    pub fn fiber_extended(&self) -> bool {
        self.extended(MotorId::M4)
    }

    /// Whether the (m1, m2) point lies within `radius` of `center`
    /// (both full positions on m1/m2).
    #[must_use]
    pub fn in_hole(&self, center: &Position, radius: f64) -> bool {
        let (Some(x), Some(y)) = (self.get(MotorId::M1), self.get(MotorId::M2)) else {
            return false;
        };
        let (Some(xc), Some(yc)) = (center.get(MotorId::M1), center.get(MotorId::M2)) else {
            return false;
        };
        let dx = xc - x;
        let dy = yc - y;
        dx * dx + dy * dy < radius * radius
    }

    /// Whether (m1, m2) lies within the pinhole mask clearance circle
    /// centred on `pmask_center`.
    #[must_use]
    pub fn in_pmask_hole(&self, pmask_center: &Position) -> bool {
        self.in_hole(pmask_center, CLEARANCE_PMASK)
    }

    /// Whether (m1, m2) lies within the fiber bundle clearance circle
    /// centred on `fiber_center`.
    #[must_use]
    pub fn in_fiber_hole(&self, fiber_center: &Position) -> bool {
        self.in_hole(fiber_center, CLEARANCE_FIBER)
    }

    /// A position is valid iff every motor it sets is a known,
    /// limit-respecting motor; AND, if fiber/mask is extended, (m1,m2)
    /// lies within `KMIRR_RADIUS` of the corresponding base centre;
    /// AND fiber and mask are never extended simultaneously. Motors
    /// absent from `metas` or unset in `self` are unconstrained (per
    /// the Open Question resolution in SPEC_FULL.md §3/§9).
    #[must_use]
    pub fn is_valid(&self, metas: &[(MotorId, MotorMeta)], fiber_center: &Position, mask_center: &Position) -> bool {
        let limits_ok = self.set_motors().all(|m| {
            let Some((_, meta)) = metas.iter().find(|(id, _)| *id == m) else {
                return false;
            };
            let v = self.get(m).unwrap();
            v >= meta.limits.0 && v <= meta.limits.1
        });
        if !limits_ok {
            return false;
        }
        let fiber_extended = self.fiber_extended();
        let mask_extended = self.mask_extended();
        if fiber_extended && !self.in_hole(fiber_center, KMIRR_RADIUS) {
            return false;
        }
        if mask_extended && !self.in_hole(mask_center, KMIRR_RADIUS) {
            return false;
        }
        !(fiber_extended && mask_extended)
    }
}

/// One entry of the configuration document: a named, fully-specified
/// position plus the table it was declared in.
#[derive(Debug, Clone, PartialEq)]
pub struct NamedConfiguration {
    pub name: String,
    pub class: ConfigClass,
    pub position: Position,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metas() -> Vec<(MotorId, MotorMeta)> {
        MotorId::ALL
            .into_iter()
            .map(|m| {
                (
                    m,
                    MotorMeta {
                        enabled: true,
                        limits: (-300.0, 300.0),
                        tolerance: 0.1,
                    },
                )
            })
            .collect()
    }

    #[test]
    fn within_tolerance_window() {
        let mut a = Position::empty();
        a.set(MotorId::M1, 10.0);
        let mut b = Position::empty();
        b.set(MotorId::M1, 10.05);
        assert!(a.within(&b, 0.1));
        b.set(MotorId::M1, 10.2);
        assert!(!a.within(&b, 0.1));
    }

    #[test]
    fn extended_predicates() {
        let mut p = Position::empty();
        p.set(MotorId::M3, 15.0);
        p.set(MotorId::M4, 0.0);
        assert!(p.mask_extended());
        assert!(!p.fiber_extended());
    }

    #[test]
    fn in_hole_uses_squared_radius_not_unsquared() {
        // center at origin, point at distance 34.9mm: inside a 35mm
        // clearance circle under the correct r^2 comparison.
        let center = Position::empty().with(MotorId::M1, 0.0).with(MotorId::M2, 0.0);
        let p = Position::empty().with(MotorId::M1, 24.0).with(MotorId::M2, 25.0);
        // distance = sqrt(24^2+25^2) = sqrt(576+625) = sqrt(1201) ~= 34.66
        assert!(p.in_hole(&center, 35.0));
        let far = Position::empty().with(MotorId::M1, 40.0).with(MotorId::M2, 40.0);
        assert!(!far.in_hole(&center, 35.0));
    }

    #[test]
    fn out_of_limits_position_invalid() {
        let p = Position::empty().with(MotorId::M1, 500.0);
        let center = Position::empty();
        assert!(!p.is_valid(&metas(), &center, &center));
    }

    #[test]
    fn unconstrained_absent_motor_is_valid() {
        let p = Position::empty().with(MotorId::M2, 10.0);
        let center = Position::empty();
        assert!(p.is_valid(&metas(), &center, &center));
    }

    #[test]
    fn extended_outside_kmirr_radius_invalid() {
        let center = Position::empty().with(MotorId::M1, 0.0).with(MotorId::M2, 0.0);
        let far_extended = Position::empty()
            .with(MotorId::M1, 100.0)
            .with(MotorId::M2, 100.0)
            .with(MotorId::M4, 20.0);
        assert!(!far_extended.is_valid(&metas(), &center, &center));
    }

    #[test]
    fn both_extended_simultaneously_invalid() {
        let center = Position::empty().with(MotorId::M1, 0.0).with(MotorId::M2, 0.0);
        let both = Position::empty().with(MotorId::M1, 0.0).with(MotorId::M2, 0.0).with(MotorId::M3, 10.0).with(MotorId::M4, 10.0);
        assert!(!both.is_valid(&metas(), &center, &center));
    }
}
