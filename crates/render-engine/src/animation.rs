//! Emoji animation formulas.
//!
//! Each [`AnimationKind`] maps to a [`Motion`]: one time-parameterized
//! expression per animated property. Expressions are plain data. They are
//! rendered into ffmpeg's expression language by [`Expr`]'s `Display`
//! impl and evaluated inside the encoder; [`Expr::eval`] is a reference
//! evaluator used to check the formulas without running ffmpeg.

use std::f64::consts::PI;
use std::fmt;

use reelsmith_scene_model::AnimationKind;

const PULSE_PERIOD_SECS: f64 = 1.5;
const PULSE_MIN_SCALE: f64 = 0.9;
const ROTATE_PERIOD_SECS: f64 = 2.0;
const ROTATE_RADIUS_PX: f64 = 10.0;
const BOUNCE_PERIOD_SECS: f64 = 1.2;
const BOUNCE_HEIGHT_PX: f64 = 15.0;
const FADE_IN_SECS: f64 = 0.5;

/// A closed expression over render time `t` (seconds).
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Const(f64),
    Time,
    Pi,
    Add(Box<Expr>, Box<Expr>),
    Sub(Box<Expr>, Box<Expr>),
    Mul(Box<Expr>, Box<Expr>),
    Div(Box<Expr>, Box<Expr>),
    Sin(Box<Expr>),
    Cos(Box<Expr>),
    Abs(Box<Expr>),
    /// `if(lt(t, threshold), then, otherwise)`.
    IfTimeBefore {
        threshold: f64,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
}

impl Expr {
    pub fn constant(value: f64) -> Self {
        Self::Const(value)
    }

    /// Evaluate at render time `t`.
    pub fn eval(&self, t: f64) -> f64 {
        match self {
            Self::Const(v) => *v,
            Self::Time => t,
            Self::Pi => PI,
            Self::Add(a, b) => a.eval(t) + b.eval(t),
            Self::Sub(a, b) => a.eval(t) - b.eval(t),
            Self::Mul(a, b) => a.eval(t) * b.eval(t),
            Self::Div(a, b) => a.eval(t) / b.eval(t),
            Self::Sin(a) => a.eval(t).sin(),
            Self::Cos(a) => a.eval(t).cos(),
            Self::Abs(a) => a.eval(t).abs(),
            Self::IfTimeBefore {
                threshold,
                then,
                otherwise,
            } => {
                if t < *threshold {
                    then.eval(t)
                } else {
                    otherwise.eval(t)
                }
            }
        }
    }

    /// Whether the expression depends on `t`.
    pub fn is_time_varying(&self) -> bool {
        match self {
            Self::Const(_) | Self::Pi => false,
            Self::Time | Self::IfTimeBefore { .. } => true,
            Self::Add(a, b) | Self::Sub(a, b) | Self::Mul(a, b) | Self::Div(a, b) => {
                a.is_time_varying() || b.is_time_varying()
            }
            Self::Sin(a) | Self::Cos(a) | Self::Abs(a) => a.is_time_varying(),
        }
    }

    fn is_additive(&self) -> bool {
        matches!(self, Self::Add(..) | Self::Sub(..))
    }

    fn is_multiplicative(&self) -> bool {
        matches!(self, Self::Mul(..) | Self::Div(..))
    }
}

fn add(a: Expr, b: Expr) -> Expr {
    Expr::Add(Box::new(a), Box::new(b))
}

fn sub(a: Expr, b: Expr) -> Expr {
    Expr::Sub(Box::new(a), Box::new(b))
}

fn mul(a: Expr, b: Expr) -> Expr {
    Expr::Mul(Box::new(a), Box::new(b))
}

fn div(a: Expr, b: Expr) -> Expr {
    Expr::Div(Box::new(a), Box::new(b))
}

/// `2*PI*t/period`
fn phase(period: f64) -> Expr {
    div(
        mul(mul(Expr::Const(2.0), Expr::Pi), Expr::Time),
        Expr::Const(period),
    )
}

/// Format a number the way it reads best in a filter expression.
pub fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let s = format!("{value:.6}");
        s.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

struct Paren<'a>(Rendered<'a>, bool);

impl fmt::Display for Paren<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.1 {
            write!(f, "({})", self.0)
        } else {
            write!(f, "{}", self.0)
        }
    }
}

/// An expression printed with a given name for the time variable.
#[derive(Clone, Copy)]
pub struct Rendered<'a> {
    expr: &'a Expr,
    time: &'a str,
}

impl<'a> Rendered<'a> {
    fn of(&self, expr: &'a Expr) -> Self {
        Self {
            expr,
            time: self.time,
        }
    }

    fn paren(&self, expr: &'a Expr, wrap: bool) -> Paren<'a> {
        Paren(self.of(expr), wrap)
    }
}

impl Expr {
    /// Print with `time` as the time variable. Filters disagree on its
    /// name: `overlay` and `scale` use `t`, `geq` uses `T`.
    pub fn with_time_var<'a>(&'a self, time: &'a str) -> Rendered<'a> {
        Rendered { expr: self, time }
    }
}

impl fmt::Display for Rendered<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let time = self.time;
        match self.expr {
            Expr::Const(v) if *v < 0.0 => write!(f, "({})", format_number(*v)),
            Expr::Const(v) => f.write_str(&format_number(*v)),
            Expr::Time => f.write_str(time),
            Expr::Pi => f.write_str("PI"),
            Expr::Add(a, b) => write!(f, "{}+{}", self.of(a), self.of(b)),
            Expr::Sub(a, b) => write!(f, "{}-{}", self.of(a), self.paren(b, b.is_additive())),
            Expr::Mul(a, b) => write!(
                f,
                "{}*{}",
                self.paren(a, a.is_additive()),
                self.paren(b, b.is_additive())
            ),
            Expr::Div(a, b) => write!(
                f,
                "{}/{}",
                self.paren(a, a.is_additive()),
                self.paren(b, b.is_additive() || b.is_multiplicative())
            ),
            Expr::Sin(a) => write!(f, "sin({})", self.of(a)),
            Expr::Cos(a) => write!(f, "cos({})", self.of(a)),
            Expr::Abs(a) => write!(f, "abs({})", self.of(a)),
            Expr::IfTimeBefore {
                threshold,
                then,
                otherwise,
            } => write!(
                f,
                "if(lt({time},{}),{},{})",
                format_number(*threshold),
                self.of(then),
                self.of(otherwise)
            ),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.with_time_var("t"), f)
    }
}

/// Per-property formulas for one overlay.
#[derive(Debug, Clone, PartialEq)]
pub struct Motion {
    /// Overlay x (top-left) in canvas pixels.
    pub x: Expr,
    /// Overlay y (top-left) in canvas pixels.
    pub y: Expr,
    /// Uniform scale factor applied to the glyph size.
    pub scale: Expr,
    /// Opacity in [0, 1].
    pub opacity: Expr,
}

impl Motion {
    /// A motionless overlay at the anchor.
    pub fn still(x: f64, y: f64) -> Self {
        Self {
            x: Expr::Const(x),
            y: Expr::Const(y),
            scale: Expr::Const(1.0),
            opacity: Expr::Const(1.0),
        }
    }

    pub fn is_static(&self) -> bool {
        !(self.x.is_time_varying()
            || self.y.is_time_varying()
            || self.scale.is_time_varying()
            || self.opacity.is_time_varying())
    }
}

/// Compile an animation kind at a static anchor into its formulas.
///
/// Properties a kind does not touch keep their static value.
pub fn compile(kind: AnimationKind, anchor_x: f64, anchor_y: f64) -> Motion {
    let still = Motion::still(anchor_x, anchor_y);
    match kind {
        AnimationKind::None => still,
        // 0.95 + 0.05*sin spans exactly [0.9, 1.0].
        AnimationKind::Pulse => {
            let mid = (1.0 + PULSE_MIN_SCALE) / 2.0;
            let amplitude = (1.0 - PULSE_MIN_SCALE) / 2.0;
            Motion {
                scale: add(
                    Expr::Const(mid),
                    mul(
                        Expr::Const(amplitude),
                        Expr::Sin(Box::new(phase(PULSE_PERIOD_SECS))),
                    ),
                ),
                ..still
            }
        }
        AnimationKind::Rotate => Motion {
            x: add(
                Expr::Const(anchor_x),
                mul(
                    Expr::Const(ROTATE_RADIUS_PX),
                    Expr::Sin(Box::new(phase(ROTATE_PERIOD_SECS))),
                ),
            ),
            y: add(
                Expr::Const(anchor_y),
                mul(
                    Expr::Const(ROTATE_RADIUS_PX),
                    Expr::Cos(Box::new(phase(ROTATE_PERIOD_SECS))),
                ),
            ),
            ..still
        },
        AnimationKind::Bounce => Motion {
            y: sub(
                Expr::Const(anchor_y),
                mul(
                    Expr::Const(BOUNCE_HEIGHT_PX),
                    Expr::Abs(Box::new(Expr::Sin(Box::new(phase(BOUNCE_PERIOD_SECS))))),
                ),
            ),
            ..still
        },
        AnimationKind::Fade => Motion {
            opacity: Expr::IfTimeBefore {
                threshold: FADE_IN_SECS,
                then: Box::new(div(Expr::Time, Expr::Const(FADE_IN_SECS))),
                otherwise: Box::new(Expr::Const(1.0)),
            },
            ..still
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const ALL_KINDS: [AnimationKind; 5] = [
        AnimationKind::None,
        AnimationKind::Pulse,
        AnimationKind::Rotate,
        AnimationKind::Bounce,
        AnimationKind::Fade,
    ];

    #[test]
    fn test_none_is_identity() {
        let motion = compile(AnimationKind::None, 120.0, 340.0);
        assert!(motion.is_static());
        assert_eq!(motion.x.to_string(), "120");
        assert_eq!(motion.y.to_string(), "340");
    }

    #[test]
    fn test_bounce_samples() {
        let motion = compile(AnimationKind::Bounce, 100.0, 500.0);
        assert!((motion.y.eval(0.0) - 500.0).abs() < 1e-9);
        assert!((motion.y.eval(0.3) - 485.0).abs() < 1e-9);
        assert!((motion.y.eval(0.6) - 500.0).abs() < 1e-9);
        assert_eq!(motion.x, Expr::Const(100.0));
    }

    #[test]
    fn test_bounce_renders_rectified_sine() {
        let motion = compile(AnimationKind::Bounce, 100.0, 200.0);
        assert_eq!(motion.y.to_string(), "200-15*abs(sin(2*PI*t/1.2))");
    }

    #[test]
    fn test_rotate_renders_sine_and_cosine() {
        let motion = compile(AnimationKind::Rotate, 50.0, 60.0);
        assert_eq!(motion.x.to_string(), "50+10*sin(2*PI*t/2)");
        assert_eq!(motion.y.to_string(), "60+10*cos(2*PI*t/2)");
    }

    #[test]
    fn test_pulse_only_scales() {
        let motion = compile(AnimationKind::Pulse, 10.0, 20.0);
        assert_eq!(motion.x, Expr::Const(10.0));
        assert_eq!(motion.y, Expr::Const(20.0));
        assert_eq!(motion.scale.to_string(), "0.95+0.05*sin(2*PI*t/1.5)");
        assert!((motion.scale.eval(1.5 / 4.0) - 1.0).abs() < 1e-9);
        assert!((motion.scale.eval(1.5 * 3.0 / 4.0) - 0.9).abs() < 1e-9);
    }

    #[test]
    fn test_fade_ramps_then_holds() {
        let motion = compile(AnimationKind::Fade, 0.0, 0.0);
        assert_eq!(motion.opacity.to_string(), "if(lt(t,0.5),t/0.5,1)");
        assert!(motion.opacity.eval(0.0).abs() < 1e-9);
        assert!((motion.opacity.eval(0.25) - 0.5).abs() < 1e-9);
        assert!((motion.opacity.eval(0.5) - 1.0).abs() < 1e-9);
        assert_eq!(
            motion.opacity.with_time_var("T").to_string(),
            "if(lt(T,0.5),T/0.5,1)"
        );
        assert!((motion.opacity.eval(7.0) - 1.0).abs() < 1e-9);
        assert_eq!(motion.x, Expr::Const(0.0));
    }

    #[test]
    fn test_negative_constants_are_parenthesized() {
        let expr = add(Expr::Const(3.0), Expr::Const(-2.5));
        assert_eq!(expr.to_string(), "3+(-2.5)");
        assert!((expr.eval(0.0) - 0.5).abs() < 1e-12);
    }

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(10.0), "10");
        assert_eq!(format_number(1.25), "1.25");
        assert_eq!(format_number(0.1 + 0.2), "0.3");
    }

    proptest! {
        #[test]
        fn prop_rotate_stays_on_circle(x in 0.0f64..720.0, y in 0.0f64..1280.0, t in 0.0f64..600.0) {
            let motion = compile(AnimationKind::Rotate, x, y);
            let dx = motion.x.eval(t) - x;
            let dy = motion.y.eval(t) - y;
            prop_assert!(((dx * dx + dy * dy).sqrt() - ROTATE_RADIUS_PX).abs() < 1e-6);
        }

        #[test]
        fn prop_bounce_stays_above_anchor(y in 0.0f64..1280.0, t in 0.0f64..600.0) {
            let value = compile(AnimationKind::Bounce, 0.0, y).y.eval(t);
            prop_assert!(value <= y + 1e-9);
            prop_assert!(value >= y - BOUNCE_HEIGHT_PX - 1e-9);
        }

        #[test]
        fn prop_envelopes_hold_for_every_kind(kind_idx in 0usize..5, t in 0.0f64..600.0) {
            let motion = compile(ALL_KINDS[kind_idx], 100.0, 100.0);
            let scale = motion.scale.eval(t);
            let opacity = motion.opacity.eval(t);
            prop_assert!((PULSE_MIN_SCALE - 1e-9..=1.0 + 1e-9).contains(&scale));
            prop_assert!((-1e-9..=1.0 + 1e-9).contains(&opacity));
        }
    }
}
