//! The closed set of frame order models and their parameter schema.

use crate::error::FrameOrderError;
use serde::{Deserialize, Serialize};
use std::f64::consts::PI;
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ModelKind {
    #[serde(rename = "rigid")]
    Rigid,
    #[serde(rename = "rotor")]
    Rotor,
    #[serde(rename = "free rotor")]
    FreeRotor,
    #[serde(rename = "iso cone")]
    IsoCone,
    #[serde(rename = "iso cone, torsionless")]
    IsoConeTorsionless,
    #[serde(rename = "iso cone, free rotor")]
    IsoConeFreeRotor,
    #[serde(rename = "pseudo-ellipse")]
    PseudoEllipse,
    #[serde(rename = "pseudo-ellipse, torsionless")]
    PseudoEllipseTorsionless,
    #[serde(rename = "pseudo-ellipse, free rotor")]
    PseudoEllipseFreeRotor,
    #[serde(rename = "line")]
    Line,
    #[serde(rename = "line, torsionless")]
    LineTorsionless,
    #[serde(rename = "line, free rotor")]
    LineFreeRotor,
}

/// How the motional eigenframe is described.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EigenFrameKind {
    /// Three ZYZ Euler angles.
    Euler,
    /// A single axis given by two spherical angles.
    Axis,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConeKind {
    /// Isotropic cone half-angle.
    Theta,
    /// Isotropic cone order parameter.
    OrderParameter,
    /// Pseudo-elliptic half-angles about x and y.
    Ellipse,
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TorsionKind {
    /// Torsion bounded by `cone_sigma_max`.
    Restricted,
    /// Unrestricted rotation about the motional axis.
    Free,
    None,
}

impl ModelKind {
    pub const ALL: [ModelKind; 12] = [
        ModelKind::Rigid,
        ModelKind::Rotor,
        ModelKind::FreeRotor,
        ModelKind::IsoCone,
        ModelKind::IsoConeTorsionless,
        ModelKind::IsoConeFreeRotor,
        ModelKind::PseudoEllipse,
        ModelKind::PseudoEllipseTorsionless,
        ModelKind::PseudoEllipseFreeRotor,
        ModelKind::Line,
        ModelKind::LineTorsionless,
        ModelKind::LineFreeRotor,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ModelKind::Rigid => "rigid",
            ModelKind::Rotor => "rotor",
            ModelKind::FreeRotor => "free rotor",
            ModelKind::IsoCone => "iso cone",
            ModelKind::IsoConeTorsionless => "iso cone, torsionless",
            ModelKind::IsoConeFreeRotor => "iso cone, free rotor",
            ModelKind::PseudoEllipse => "pseudo-ellipse",
            ModelKind::PseudoEllipseTorsionless => "pseudo-ellipse, torsionless",
            ModelKind::PseudoEllipseFreeRotor => "pseudo-ellipse, free rotor",
            ModelKind::Line => "line",
            ModelKind::LineTorsionless => "line, torsionless",
            ModelKind::LineFreeRotor => "line, free rotor",
        }
    }

    pub fn is_pseudo_ellipse(self) -> bool {
        matches!(
            self,
            ModelKind::PseudoEllipse
                | ModelKind::PseudoEllipseTorsionless
                | ModelKind::PseudoEllipseFreeRotor
        )
    }

    pub fn is_iso_cone(self) -> bool {
        matches!(
            self,
            ModelKind::IsoCone | ModelKind::IsoConeTorsionless | ModelKind::IsoConeFreeRotor
        )
    }

    pub fn is_line(self) -> bool {
        matches!(
            self,
            ModelKind::Line | ModelKind::LineTorsionless | ModelKind::LineFreeRotor
        )
    }

    /// Models whose average position loses the alpha angle to the free rotation.
    pub fn has_reduced_average_position(self) -> bool {
        matches!(self, ModelKind::FreeRotor | ModelKind::IsoConeFreeRotor)
    }

    /// Any model other than `rigid` moves one domain relative to the other.
    pub fn supports_pivot(self) -> bool {
        self != ModelKind::Rigid
    }

    pub fn eigenframe(self) -> EigenFrameKind {
        if self.is_pseudo_ellipse() {
            EigenFrameKind::Euler
        } else if self.is_iso_cone() || matches!(self, ModelKind::Rotor | ModelKind::FreeRotor) {
            EigenFrameKind::Axis
        } else {
            EigenFrameKind::None
        }
    }

    pub fn cone(self) -> ConeKind {
        match self {
            _ if self.is_pseudo_ellipse() => ConeKind::Ellipse,
            ModelKind::IsoConeFreeRotor => ConeKind::OrderParameter,
            ModelKind::IsoCone | ModelKind::IsoConeTorsionless => ConeKind::Theta,
            _ => ConeKind::None,
        }
    }

    pub fn torsion(self) -> TorsionKind {
        match self {
            ModelKind::Rigid
            | ModelKind::IsoConeTorsionless
            | ModelKind::PseudoEllipseTorsionless
            | ModelKind::LineTorsionless => TorsionKind::None,
            ModelKind::FreeRotor
            | ModelKind::IsoConeFreeRotor
            | ModelKind::PseudoEllipseFreeRotor
            | ModelKind::LineFreeRotor => TorsionKind::Free,
            ModelKind::Rotor | ModelKind::IsoCone | ModelKind::PseudoEllipse | ModelKind::Line => {
                TorsionKind::Restricted
            }
        }
    }

    /// The ordered list of optimised parameters.
    pub fn param_list(self, pivot_fixed: bool, translation_fixed: bool) -> Vec<Param> {
        let mut params = Vec::with_capacity(Param::COUNT);

        if !pivot_fixed {
            params.extend([Param::PivotX, Param::PivotY, Param::PivotZ]);
        }
        if !translation_fixed {
            params.extend([Param::AvePosX, Param::AvePosY, Param::AvePosZ]);
        }

        if self.has_reduced_average_position() {
            params.extend([Param::AvePosBeta, Param::AvePosGamma]);
        } else {
            params.extend([Param::AvePosAlpha, Param::AvePosBeta, Param::AvePosGamma]);
        }

        match self.eigenframe() {
            EigenFrameKind::Euler => {
                params.extend([Param::EigenAlpha, Param::EigenBeta, Param::EigenGamma])
            }
            EigenFrameKind::Axis => params.extend([Param::AxisTheta, Param::AxisPhi]),
            EigenFrameKind::None => {}
        }

        match self.cone() {
            ConeKind::Ellipse => params.extend([Param::ConeThetaX, Param::ConeThetaY]),
            ConeKind::OrderParameter => params.push(Param::ConeS1),
            ConeKind::Theta => params.push(Param::ConeTheta),
            ConeKind::None => {}
        }

        if self.torsion() == TorsionKind::Restricted {
            params.push(Param::ConeSigmaMax);
        }

        params
    }

    /// Parameters derived from the optimised ones and stored alongside them.
    pub fn derived_params(self) -> &'static [Param] {
        match self {
            ModelKind::IsoConeFreeRotor => &[Param::ConeTheta],
            _ => &[],
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ModelKind {
    type Err = FrameOrderError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .into_iter()
            .find(|model| model.name() == name)
            .ok_or_else(|| FrameOrderError::InvalidModel(name.to_string()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Param {
    PivotX,
    PivotY,
    PivotZ,
    AvePosX,
    AvePosY,
    AvePosZ,
    AvePosAlpha,
    AvePosBeta,
    AvePosGamma,
    EigenAlpha,
    EigenBeta,
    EigenGamma,
    AxisTheta,
    AxisPhi,
    ConeThetaX,
    ConeThetaY,
    ConeTheta,
    ConeS1,
    ConeSigmaMax,
}

/// Grid search spacing rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GridPolicy {
    /// +/- 10 Angstrom around the current pivot.
    Pivot,
    /// +/- 5 Angstrom around the origin.
    Translation,
    /// Linear over `[0, 2pi (1 - 1/inc)]`.
    FullAngle,
    /// Arc-cosine spacing over `[0, pi]`.
    PolarAngle,
    /// Linear over `[pi/inc, pi (1 - 1/inc)]`.
    BoundedAngle,
    /// Linear over `[-0.125, 1]`.
    OrderParameter,
}

impl Param {
    pub const COUNT: usize = 19;

    pub const ALL: [Param; Param::COUNT] = [
        Param::PivotX,
        Param::PivotY,
        Param::PivotZ,
        Param::AvePosX,
        Param::AvePosY,
        Param::AvePosZ,
        Param::AvePosAlpha,
        Param::AvePosBeta,
        Param::AvePosGamma,
        Param::EigenAlpha,
        Param::EigenBeta,
        Param::EigenGamma,
        Param::AxisTheta,
        Param::AxisPhi,
        Param::ConeThetaX,
        Param::ConeThetaY,
        Param::ConeTheta,
        Param::ConeS1,
        Param::ConeSigmaMax,
    ];

    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Param::PivotX => "pivot_x",
            Param::PivotY => "pivot_y",
            Param::PivotZ => "pivot_z",
            Param::AvePosX => "ave_pos_x",
            Param::AvePosY => "ave_pos_y",
            Param::AvePosZ => "ave_pos_z",
            Param::AvePosAlpha => "ave_pos_alpha",
            Param::AvePosBeta => "ave_pos_beta",
            Param::AvePosGamma => "ave_pos_gamma",
            Param::EigenAlpha => "eigen_alpha",
            Param::EigenBeta => "eigen_beta",
            Param::EigenGamma => "eigen_gamma",
            Param::AxisTheta => "axis_theta",
            Param::AxisPhi => "axis_phi",
            Param::ConeThetaX => "cone_theta_x",
            Param::ConeThetaY => "cone_theta_y",
            Param::ConeTheta => "cone_theta",
            Param::ConeS1 => "cone_s1",
            Param::ConeSigmaMax => "cone_sigma_max",
        }
    }

    pub fn is_pivot(self) -> bool {
        matches!(self, Param::PivotX | Param::PivotY | Param::PivotZ)
    }

    /// Orientation angles wrapped into a canonical window after optimisation.
    pub fn is_wrapped_angle(self) -> bool {
        matches!(
            self,
            Param::AvePosAlpha
                | Param::AvePosBeta
                | Param::AvePosGamma
                | Param::EigenAlpha
                | Param::EigenBeta
                | Param::EigenGamma
                | Param::AxisTheta
                | Param::AxisPhi
        )
    }

    pub fn grid_policy(self) -> GridPolicy {
        match self {
            Param::PivotX | Param::PivotY | Param::PivotZ => GridPolicy::Pivot,
            Param::AvePosX | Param::AvePosY | Param::AvePosZ => GridPolicy::Translation,
            Param::AvePosAlpha
            | Param::AvePosGamma
            | Param::EigenAlpha
            | Param::EigenGamma
            | Param::AxisPhi => GridPolicy::FullAngle,
            Param::AvePosBeta | Param::EigenBeta | Param::AxisTheta => GridPolicy::PolarAngle,
            Param::ConeS1 => GridPolicy::OrderParameter,
            Param::ConeThetaX | Param::ConeThetaY | Param::ConeTheta | Param::ConeSigmaMax => {
                GridPolicy::BoundedAngle
            }
        }
    }

    /// Bounds used when mapping the chi-squared space; `current` is only
    /// consulted for the pivot coordinates.
    pub fn map_bounds(self, current: f64) -> [f64; 2] {
        match self {
            Param::PivotX | Param::PivotY | Param::PivotZ => [current - 100.0, current + 100.0],
            Param::AvePosX | Param::AvePosY | Param::AvePosZ => [-100.0, 100.0],
            Param::AvePosAlpha
            | Param::AvePosBeta
            | Param::AvePosGamma
            | Param::EigenAlpha
            | Param::EigenBeta
            | Param::EigenGamma
            | Param::AxisPhi => [0.0, 2.0 * PI],
            Param::AxisTheta
            | Param::ConeThetaX
            | Param::ConeThetaY
            | Param::ConeTheta
            | Param::ConeSigmaMax => [0.0, PI],
            Param::ConeS1 => [-0.125, 1.0],
        }
    }
}

impl fmt::Display for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Param {
    type Err = FrameOrderError;

    fn from_str(name: &str) -> Result<Self, Self::Err> {
        Param::ALL
            .into_iter()
            .find(|param| param.name() == name)
            .ok_or_else(|| FrameOrderError::MissingParameter(name.to_string()))
    }
}
