//! Page transition choreography
//!
//! Drives a two-surface (front/back) slide between the displayed page and a
//! target page. The machine itself is pure: it consumes navigation
//! requests, back-surface readiness, frame ticks and clock ticks, and emits
//! effects the owning view executes against the render pipeline. An epoch
//! counter makes superseded completions no-ops.

use std::time::{Duration, Instant};

/// Slide animation length
pub const SLIDE_DURATION: Duration = Duration::from_millis(300);
/// Extra margin after the animation before the surfaces swap roles
pub const SLIDE_GRACE: Duration = Duration::from_millis(60);
/// Frame ticks to wait after the no-transition snap so it has painted
const SNAP_FRAME_TICKS: u8 = 2;

/// Which side the back surface slides in from
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SlideDirection {
    Forward,
    Backward,
}

impl SlideDirection {
    /// `+1` when navigating to a later page, `-1` otherwise
    #[must_use]
    pub const fn offset(self) -> i32 {
        match self {
            Self::Forward => 1,
            Self::Backward => -1,
        }
    }
}

/// Work the owning view must perform in response to a state change
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransitionEffect {
    /// Render this page into the back surface, then report `back_ready`
    /// with the given epoch
    RenderToBack { page: usize, epoch: u64 },
    /// Instantly position the back surface at its off-screen start, with
    /// transitions disabled
    SnapBack { direction: SlideDirection },
    /// Apply the animated transforms sliding the old page out and the new
    /// page in
    BeginSlide { direction: SlideDirection },
    /// Overwrite the front surface with the back surface content and reset
    /// the back surface off-screen
    PromoteBack { page: usize },
}

#[derive(Debug, PartialEq)]
enum State {
    Idle,
    /// Waiting for the target page's raster to land on the back surface
    Preparing {
        target: usize,
        direction: SlideDirection,
    },
    /// Snap applied; counting down frame ticks before the slide starts
    SnapPainting {
        target: usize,
        direction: SlideDirection,
        ticks_left: u8,
    },
    Animating {
        target: usize,
        started: Instant,
    },
}

/// Front/back page transition state machine
pub struct Choreographer {
    displayed: usize,
    epoch: u64,
    state: State,
}

impl Choreographer {
    #[must_use]
    pub fn new(initial_page: usize) -> Self {
        Self {
            displayed: initial_page,
            epoch: 0,
            state: State::Idle,
        }
    }

    /// Page currently committed to the front surface
    #[must_use]
    pub fn displayed(&self) -> usize {
        self.displayed
    }

    #[must_use]
    pub fn is_idle(&self) -> bool {
        self.state == State::Idle
    }

    /// Request navigation to a page.
    ///
    /// Supersedes any transition in flight: the abandoned transition's
    /// completion becomes a no-op and a fresh cycle starts from the page
    /// that is actually displayed, not the abandoned target.
    pub fn request_page(&mut self, target: usize) -> Vec<TransitionEffect> {
        // Any epoch bump invalidates in-flight back_ready callbacks.
        self.epoch += 1;

        if target == self.displayed {
            self.state = State::Idle;
            return vec![];
        }

        let direction = if target > self.displayed {
            SlideDirection::Forward
        } else {
            SlideDirection::Backward
        };
        self.state = State::Preparing { target, direction };
        vec![TransitionEffect::RenderToBack {
            page: target,
            epoch: self.epoch,
        }]
    }

    /// The back surface now holds the target page's raster
    pub fn back_ready(&mut self, epoch: u64) -> Vec<TransitionEffect> {
        if epoch != self.epoch {
            return vec![];
        }
        match self.state {
            State::Preparing { target, direction } => {
                self.state = State::SnapPainting {
                    target,
                    direction,
                    ticks_left: SNAP_FRAME_TICKS,
                };
                vec![TransitionEffect::SnapBack { direction }]
            }
            _ => vec![],
        }
    }

    /// One animation-frame tick has painted
    pub fn frame_tick(&mut self, now: Instant) -> Vec<TransitionEffect> {
        match self.state {
            State::SnapPainting {
                target,
                direction,
                ticks_left,
            } => {
                let ticks_left = ticks_left.saturating_sub(1);
                if ticks_left == 0 {
                    self.state = State::Animating {
                        target,
                        started: now,
                    };
                    vec![TransitionEffect::BeginSlide { direction }]
                } else {
                    self.state = State::SnapPainting {
                        target,
                        direction,
                        ticks_left,
                    };
                    vec![]
                }
            }
            _ => vec![],
        }
    }

    /// Advance wall-clock time; completes the slide once duration plus
    /// grace has elapsed
    pub fn tick(&mut self, now: Instant) -> Vec<TransitionEffect> {
        match self.state {
            State::Animating { target, started }
                if now.duration_since(started) >= SLIDE_DURATION + SLIDE_GRACE =>
            {
                self.displayed = target;
                self.state = State::Idle;
                vec![TransitionEffect::PromoteBack { page: target }]
            }
            _ => vec![],
        }
    }
}
