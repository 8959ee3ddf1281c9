//! Authoritative world state and the per-tick physics step.
//!
//! Everything here is pure in-memory data; the game loop owns the only
//! `World` instance and is the sole caller of its mutating methods.

use crate::error::ServerError;
use log::{debug, info};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::{
    clamp_paddle_y, BallView, PaddlePosition, PlayerView, Role, Snapshot, ARENA_HEIGHT,
    ARENA_WIDTH, BALL_RADIUS, BALL_SPEED, LEFT_PLAYER_ID, MAX_BALL_SPEED, PADDLE_HEIGHT,
    PADDLE_OFFSET, PADDLE_SPEEDUP, PADDLE_WIDTH, RIGHT_PLAYER_ID,
};

/// Tunable dimensions and speeds of a match.
#[derive(Debug, Clone, PartialEq)]
pub struct GameConfig {
    pub width: f32,
    pub height: f32,
    pub paddle_width: f32,
    pub paddle_height: f32,
    pub paddle_offset: f32,
    pub ball_radius: f32,
    pub ball_speed: f32,
    /// Multiplier applied to `dx` on every paddle hit. `1.0` disables speed-up.
    pub paddle_speedup: f32,
    pub max_ball_speed: f32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            width: ARENA_WIDTH,
            height: ARENA_HEIGHT,
            paddle_width: PADDLE_WIDTH,
            paddle_height: PADDLE_HEIGHT,
            paddle_offset: PADDLE_OFFSET,
            ball_radius: BALL_RADIUS,
            ball_speed: BALL_SPEED,
            paddle_speedup: PADDLE_SPEEDUP,
            max_ball_speed: MAX_BALL_SPEED,
        }
    }
}

impl GameConfig {
    /// Checks that the arena can actually hold a ball and two paddles.
    pub fn validate(&self) -> Result<(), ServerError> {
        let invalid = |reason: String| Err(ServerError::InvalidConfig(reason));

        let fields = [
            ("width", self.width),
            ("height", self.height),
            ("paddle width", self.paddle_width),
            ("paddle height", self.paddle_height),
            ("paddle offset", self.paddle_offset),
            ("ball radius", self.ball_radius),
            ("ball speed", self.ball_speed),
            ("paddle speed-up", self.paddle_speedup),
            ("max ball speed", self.max_ball_speed),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value < 0.0 {
                return invalid(format!(
                    "{} must be a finite non-negative number, got {}",
                    name, value
                ));
            }
        }

        if self.width == 0.0 || self.height == 0.0 {
            return invalid(format!("arena {}x{} is empty", self.width, self.height));
        }
        if self.height <= 2.0 * self.ball_radius {
            return invalid("ball does not fit vertically in the arena".to_string());
        }
        if self.paddle_height > self.height {
            return invalid(format!(
                "paddle height {} exceeds arena height {}",
                self.paddle_height, self.height
            ));
        }
        if 2.0 * (self.paddle_offset + self.paddle_width) >= self.width {
            return invalid("paddles overlap horizontally".to_string());
        }
        if self.paddle_speedup < 1.0 {
            return invalid(format!("paddle speed-up {} slows the ball", self.paddle_speedup));
        }
        if self.max_ball_speed < self.ball_speed {
            return invalid("max ball speed is below the serve speed".to_string());
        }
        Ok(())
    }
}

/// Which half of the arena a paddle defends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn index(self) -> usize {
        match self {
            Side::Left => 0,
            Side::Right => 1,
        }
    }

    fn from_role(role: Role) -> Option<Side> {
        match role {
            Role::PlayerLeft => Some(Side::Left),
            Role::PlayerRight => Some(Side::Right),
            Role::Observer => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Ball {
    pub x: f32,
    pub y: f32,
    pub dx: f32,
    pub dy: f32,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Paddle {
    /// Left edge; fixed for the lifetime of the world.
    pub x: f32,
    /// Top edge, always within `[0, height - paddle_height]`.
    pub y: f32,
    pub score: u32,
}

/// The authoritative state of one match.
pub struct World {
    config: GameConfig,
    paddles: [Paddle; 2],
    ball: Ball,
    tick: u64,
    rng: StdRng,
}

impl World {
    /// Builds a world with both paddles centred and the ball at the centre,
    /// serving from an entropy-seeded generator.
    pub fn new(config: GameConfig) -> Self {
        Self::with_rng(config, StdRng::from_entropy())
    }

    /// Builds a world whose serve directions are reproducible.
    pub fn with_seed(config: GameConfig, seed: u64) -> Self {
        Self::with_rng(config, StdRng::seed_from_u64(seed))
    }

    fn with_rng(config: GameConfig, rng: StdRng) -> Self {
        let paddle_y = clamp_paddle_y(
            (config.height - config.paddle_height) / 2.0,
            config.height,
            config.paddle_height,
        );
        let left = Paddle {
            x: config.paddle_offset,
            y: paddle_y,
            score: 0,
        };
        let right = Paddle {
            x: config.width - config.paddle_offset - config.paddle_width,
            y: paddle_y,
            score: 0,
        };
        let ball = Ball {
            x: config.width / 2.0,
            y: config.height / 2.0,
            dx: config.ball_speed,
            dy: config.ball_speed,
        };

        Self {
            config,
            paddles: [left, right],
            ball,
            tick: 0,
            rng,
        }
    }

    /// Dimensions and speeds this world was built with.
    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// Current ball position and velocity. Velocity never leaves the server.
    pub fn ball(&self) -> Ball {
        self.ball
    }

    /// Current state of the paddle on `side`, including its score.
    pub fn paddle(&self, side: Side) -> Paddle {
        self.paddles[side.index()]
    }

    /// Number of steps taken since the world was built.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Advances the simulation by one tick.
    ///
    /// Returns the side that scored, if the ball left the arena this tick.
    pub fn step(&mut self) -> Option<Side> {
        self.tick += 1;

        let prev_x = self.ball.x;
        self.ball.x += self.ball.dx;
        self.ball.y += self.ball.dy;

        self.bounce_off_walls();
        self.bounce_off_paddles(prev_x);

        let r = self.config.ball_radius;
        let scorer = if self.ball.x - r < 0.0 {
            Some(Side::Right)
        } else if self.ball.x + r > self.config.width {
            Some(Side::Left)
        } else {
            None
        };

        if let Some(side) = scorer {
            let paddle = &mut self.paddles[side.index()];
            paddle.score = paddle.score.saturating_add(1);
            info!(
                "Point for {:?}, score {}-{}",
                side, self.paddles[0].score, self.paddles[1].score
            );
            self.serve();
        }

        scorer
    }

    fn bounce_off_walls(&mut self) {
        let r = self.config.ball_radius;
        let h = self.config.height;

        if self.ball.y - r < 0.0 {
            self.ball.y = 2.0 * r - self.ball.y;
            self.ball.dy = -self.ball.dy;
        } else if self.ball.y + r > h {
            self.ball.y = 2.0 * (h - r) - self.ball.y;
            self.ball.dy = -self.ball.dy;
        }

        // A single mirror is enough unless dy exceeds the arena height.
        self.ball.y = self.ball.y.max(r).min(h - r);
    }

    fn bounce_off_paddles(&mut self, prev_x: f32) {
        let r = self.config.ball_radius;

        if self.ball.dx < 0.0 {
            let left = self.paddles[Side::Left.index()];
            let face = left.x + self.config.paddle_width;
            let crossed = prev_x - r >= face && self.ball.x - r < face;
            if crossed && self.within_paddle_span(&left) {
                let overshoot = face - (self.ball.x - r);
                self.ball.x = face + r + overshoot;
                self.ball.dx = self.returned_speed();
            }
        } else if self.ball.dx > 0.0 {
            let right = self.paddles[Side::Right.index()];
            let face = right.x;
            let crossed = prev_x + r <= face && self.ball.x + r > face;
            if crossed && self.within_paddle_span(&right) {
                let overshoot = self.ball.x + r - face;
                self.ball.x = face - r - overshoot;
                self.ball.dx = -self.returned_speed();
            }
        }
    }

    fn within_paddle_span(&self, paddle: &Paddle) -> bool {
        self.ball.y >= paddle.y && self.ball.y <= paddle.y + self.config.paddle_height
    }

    /// Horizontal speed after a paddle hit, before the direction flip.
    fn returned_speed(&self) -> f32 {
        let speed = self.ball.dx.abs();
        let cap = self.config.max_ball_speed.max(speed);
        (speed * self.config.paddle_speedup).min(cap)
    }

    /// Puts the ball back at the centre with a random diagonal direction.
    fn serve(&mut self) {
        let speed = self.config.ball_speed;
        let dx = if self.rng.gen_bool(0.5) { speed } else { -speed };
        let dy = if self.rng.gen_bool(0.5) { speed } else { -speed };

        self.ball = Ball {
            x: self.config.width / 2.0,
            y: self.config.height / 2.0,
            dx,
            dy,
        };
    }

    /// Moves the paddle owned by `role` by `delta`, clamped to the arena.
    ///
    /// Returns false when nothing moved: observer role or a non-finite delta.
    pub fn apply_paddle_move(&mut self, role: Role, delta: f32) -> bool {
        let Some(side) = Side::from_role(role) else {
            debug!("Ignoring paddle move from {}", role);
            return false;
        };
        if !delta.is_finite() {
            debug!("Ignoring non-finite paddle delta for {}", role);
            return false;
        }

        let paddle = &mut self.paddles[side.index()];
        paddle.y = clamp_paddle_y(
            paddle.y + delta,
            self.config.height,
            self.config.paddle_height,
        );
        true
    }

    /// Copies the client-visible state: paddle positions, scores and ball
    /// position. The copy is detached from the world.
    pub fn snapshot(&self) -> Snapshot {
        let view = |id: u32, paddle: &Paddle| PlayerView {
            id,
            score: paddle.score,
            position: PaddlePosition { y: paddle.y },
        };

        Snapshot {
            players: vec![
                view(LEFT_PLAYER_ID, &self.paddles[Side::Left.index()]),
                view(RIGHT_PLAYER_ID, &self.paddles[Side::Right.index()]),
            ],
            ball: BallView {
                x: self.ball.x,
                y: self.ball.y,
            },
        }
    }
}
