//! Metaball motion: Euler integration, edge bounce and obstacle resolution.
//!
//! Motion is deliberately non-physical. Bounces are perfectly elastic and the
//! obstacle pass resolves one rect at a time, so a ball wedged between two
//! overlapping rects gets two corrections in a row rather than a joint solve.

use crate::geometry::Rect;
use rand::Rng;

/// Smallest radius handed out, in device pixels.
const RADIUS_FLOOR: f32 = 8.0;
const MIN_RADIUS_FRACTION: f32 = 0.025;
const MAX_RADIUS_FRACTION: f32 = 0.045;
/// Minimum spread between the smallest and largest radius.
const RADIUS_SPREAD: f32 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Metaball {
    pub x: f32,
    pub y: f32,
    /// Pixels per frame.
    pub vx: f32,
    pub vy: f32,
    /// Fixed for the ball's lifetime, always positive.
    pub r: f32,
}

/// Radius bounds `[min, max)` for a canvas.
pub fn radius_range(width: f32, height: f32) -> (f32, f32) {
    let min_dim = width.min(height);
    let min_r = RADIUS_FLOOR.max((min_dim * MIN_RADIUS_FRACTION).round());
    let max_r = (min_r + RADIUS_SPREAD).max((min_dim * MAX_RADIUS_FRACTION).round());
    (min_r, max_r)
}

/// Seed `count` balls uniformly inside the canvas, inset by each radius.
pub fn create_metaballs<R: Rng + ?Sized>(
    rng: &mut R,
    count: usize,
    width: f32,
    height: f32,
    speed: f32,
) -> Vec<Metaball> {
    let (min_r, max_r) = radius_range(width, height);
    (0..count)
        .map(|_| {
            let r = rng.gen_range(min_r..max_r);
            // A canvas smaller than the ball collapses the range to the center.
            let x = inset_sample(rng, r, width);
            let y = inset_sample(rng, r, height);
            Metaball {
                x,
                y,
                vx: (rng.gen::<f32>() - 0.5) * speed,
                vy: (rng.gen::<f32>() - 0.5) * speed,
                r,
            }
        })
        .collect()
}

fn inset_sample<R: Rng + ?Sized>(rng: &mut R, r: f32, dim: f32) -> f32 {
    let span = dim - 2.0 * r;
    if span > 0.0 {
        r + rng.gen::<f32>() * span
    } else {
        dim / 2.0
    }
}

/// One Euler step, then flip any velocity component whose axis left the
/// inset band `[r, dim - r]`.
pub fn advance(ball: &mut Metaball, width: f32, height: f32) {
    ball.x += ball.vx;
    ball.y += ball.vy;

    if ball.x < ball.r || ball.x > width - ball.r {
        ball.vx = -ball.vx;
    }
    if ball.y < ball.r || ball.y > height - ball.r {
        ball.vy = -ball.vy;
    }
}

/// Push a ball out of every rect it overlaps, in order.
pub fn bounce_off_rects(ball: &mut Metaball, rects: &[Rect]) {
    for rect in rects {
        bounce_off_rect(ball, rect);
    }
}

fn bounce_off_rect(ball: &mut Metaball, rect: &Rect) {
    let (closest_x, closest_y) = rect.closest_point(ball.x, ball.y);
    let dist_x = ball.x - closest_x;
    let dist_y = ball.y - closest_y;
    let distance = (dist_x * dist_x + dist_y * dist_y).sqrt();

    if distance >= ball.r {
        return;
    }

    let inside_x = ball.x >= rect.x && ball.x <= rect.right();
    let inside_y = ball.y >= rect.y && ball.y <= rect.top();

    match (inside_x, inside_y) {
        (true, true) => {
            let escape_left = ball.x - rect.x + ball.r;
            let escape_right = rect.right() - ball.x + ball.r;
            let escape_bottom = ball.y - rect.y + ball.r;
            let escape_top = rect.top() - ball.y + ball.r;
            let min_escape = escape_left
                .min(escape_right)
                .min(escape_bottom)
                .min(escape_top);

            if min_escape == escape_left {
                push_left(ball, rect);
            } else if min_escape == escape_right {
                push_right(ball, rect);
            } else if min_escape == escape_bottom {
                push_down(ball, rect);
            } else {
                push_up(ball, rect);
            }
        }
        (true, false) => {
            if dist_y > 0.0 {
                push_up(ball, rect);
            } else {
                push_down(ball, rect);
            }
        }
        (false, true) => {
            if dist_x > 0.0 {
                push_right(ball, rect);
            } else {
                push_left(ball, rect);
            }
        }
        (false, false) => {
            // Corner: outside on both axes, so distance > 0.
            let nx = dist_x / distance;
            let ny = dist_y / distance;
            ball.x = closest_x + nx * ball.r;
            ball.y = closest_y + ny * ball.r;
            let dot = ball.vx * nx + ball.vy * ny;
            if dot < 0.0 {
                ball.vx -= 2.0 * dot * nx;
                ball.vy -= 2.0 * dot * ny;
            }
        }
    }
}

fn push_left(ball: &mut Metaball, rect: &Rect) {
    ball.x = rect.x - ball.r;
    ball.vx = -ball.vx.abs();
}

fn push_right(ball: &mut Metaball, rect: &Rect) {
    ball.x = rect.right() + ball.r;
    ball.vx = ball.vx.abs();
}

fn push_down(ball: &mut Metaball, rect: &Rect) {
    ball.y = rect.y - ball.r;
    ball.vy = -ball.vy.abs();
}

fn push_up(ball: &mut Metaball, rect: &Rect) {
    ball.y = rect.top() + ball.r;
    ball.vy = ball.vy.abs();
}

/// The full particle set for one canvas size.
#[derive(Debug, Clone)]
pub struct Simulation {
    balls: Vec<Metaball>,
    width: f32,
    height: f32,
}

impl Simulation {
    pub fn new<R: Rng + ?Sized>(
        rng: &mut R,
        count: usize,
        width: f32,
        height: f32,
        speed: f32,
    ) -> Self {
        Self {
            balls: create_metaballs(rng, count, width, height, speed),
            width,
            height,
        }
    }

    pub fn from_balls(balls: Vec<Metaball>, width: f32, height: f32) -> Self {
        Self { balls, width, height }
    }

    pub fn balls(&self) -> &[Metaball] {
        &self.balls
    }

    pub fn len(&self) -> usize {
        self.balls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.balls.is_empty()
    }

    pub fn size(&self) -> (f32, f32) {
        (self.width, self.height)
    }

    /// Advance every ball one frame. Obstacles are only resolved when given.
    pub fn step(&mut self, obstacles: Option<&[Rect]>) {
        for ball in &mut self.balls {
            advance(ball, self.width, self.height);
            if let Some(rects) = obstacles {
                bounce_off_rects(ball, rects);
            }
        }
    }

    /// Write `x, y, r` per ball into `out`, replacing its contents.
    pub fn pack_into(&self, out: &mut Vec<f32>) {
        out.clear();
        out.reserve(self.balls.len() * 3);
        for ball in &self.balls {
            out.extend_from_slice(&[ball.x, ball.y, ball.r]);
        }
    }
}
