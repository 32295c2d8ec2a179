//! Physics adapter wrapping `Rapier2D`.
//!
//! Owns the arena boundary sensor, the static paddle bodies and the dynamic
//! ball bodies. The adapter only tags bodies and reports collision events in
//! step order; interpreting them into scoring and respawns is the
//! simulation's job.

use rapier2d::prelude::*;
use std::collections::HashMap;
use std::sync::Mutex;

/// A rigid body and its single collider, as handed out by the adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BodyHandle {
    body: RigidBodyHandle,
    collider: ColliderHandle,
}

impl BodyHandle {
    pub fn collider(&self) -> ColliderHandle {
        self.collider
    }
}

/// Events surfaced to the simulation, in the order the solver produced them.
#[derive(Debug, Clone, Copy)]
pub enum PhysicsEvent {
    /// A ball stopped intersecting the boundary sensor, i.e. left the arena.
    /// Carries the ball's position at separation.
    BoundaryExit {
        ball: ColliderHandle,
        x: f32,
        y: f32,
    },
    /// Contact started between a ball and a paddle.
    PaddleHit {
        ball: ColliderHandle,
        paddle: ColliderHandle,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Tag {
    Boundary,
    Paddle,
    Ball,
}

/// Collects raw collision events emitted during one pipeline step.
#[derive(Default)]
struct EventCollector {
    collisions: Mutex<Vec<CollisionEvent>>,
}

impl EventCollector {
    fn drain(&self) -> Vec<CollisionEvent> {
        self.collisions
            .lock()
            .map(|mut events| std::mem::take(&mut *events))
            .unwrap_or_default()
    }
}

impl EventHandler for EventCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let Ok(mut events) = self.collisions.lock() {
            events.push(event);
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}

/// Zero-gravity physics world for one arena.
pub struct ArenaPhysics {
    bodies: RigidBodySet,
    colliders: ColliderSet,
    integration_parameters: IntegrationParameters,
    pipeline: PhysicsPipeline,
    islands: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joints: ImpulseJointSet,
    multibody_joints: MultibodyJointSet,
    ccd_solver: CCDSolver,
    gravity: Vector<Real>,
    tags: HashMap<ColliderHandle, Tag>,
    events: EventCollector,
}

impl ArenaPhysics {
    pub fn new(arena_radius: f32) -> Self {
        let mut adapter = Self {
            bodies: RigidBodySet::new(),
            colliders: ColliderSet::new(),
            integration_parameters: IntegrationParameters::default(),
            pipeline: PhysicsPipeline::new(),
            islands: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joints: ImpulseJointSet::new(),
            multibody_joints: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            gravity: vector![0.0, 0.0],
            tags: HashMap::new(),
            events: EventCollector::default(),
        };

        // The boundary is a filled sensor disc: intersection ends exactly
        // when a ball leaves the arena.
        let boundary = ColliderBuilder::ball(arena_radius)
            .sensor(true)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let handle = adapter.colliders.insert(boundary);
        adapter.tags.insert(handle, Tag::Boundary);

        adapter
    }

    /// Insert a static paddle rectangle at the origin; callers position it
    /// via [`ArenaPhysics::set_paddle_pose`].
    pub fn create_paddle(&mut self, half_width: f32, half_height: f32) -> BodyHandle {
        let body = self.bodies.insert(RigidBodyBuilder::fixed().build());
        let collider = ColliderBuilder::cuboid(half_width, half_height)
            .restitution(1.0)
            .friction(0.0)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);
        self.tags.insert(collider, Tag::Paddle);
        BodyHandle { body, collider }
    }

    /// Teleport a paddle to the given position and rotation.
    pub fn set_paddle_pose(&mut self, handle: BodyHandle, x: f32, y: f32, angle: f32) {
        if let Some(body) = self.bodies.get_mut(handle.body) {
            body.set_position(Isometry::new(vector![x, y], angle), true);
        }
    }

    /// Spawn a dynamic ball with the given initial velocity.
    pub fn create_ball(&mut self, radius: f32, x: f32, y: f32, vx: f32, vy: f32) -> BodyHandle {
        let body = self.bodies.insert(
            RigidBodyBuilder::dynamic()
                .translation(vector![x, y])
                .linvel(vector![vx, vy])
                .ccd_enabled(true)
                .build(),
        );
        let collider = ColliderBuilder::ball(radius)
            .restitution(1.0)
            .friction(0.0)
            .active_events(ActiveEvents::COLLISION_EVENTS)
            .build();
        let collider = self
            .colliders
            .insert_with_parent(collider, body, &mut self.bodies);
        self.tags.insert(collider, Tag::Ball);
        BodyHandle { body, collider }
    }

    /// Release a body and its collider. Safe to call with stale handles.
    pub fn remove_body(&mut self, handle: BodyHandle) {
        self.tags.remove(&handle.collider);
        self.bodies.remove(
            handle.body,
            &mut self.islands,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            true,
        );
    }

    /// Position and velocity of a ball body.
    pub fn ball_state(&self, handle: BodyHandle) -> Option<(f32, f32, f32, f32)> {
        let body = self.bodies.get(handle.body)?;
        let pos = body.translation();
        let vel = body.linvel();
        Some((pos.x, pos.y, vel.x, vel.y))
    }

    /// Advance the solver by `dt` and return the tagged events it produced.
    pub fn step(&mut self, dt: f32) -> Vec<PhysicsEvent> {
        self.integration_parameters.dt = dt;
        self.pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.islands,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.bodies,
            &mut self.colliders,
            &mut self.impulse_joints,
            &mut self.multibody_joints,
            &mut self.ccd_solver,
            &(),
            &self.events,
        );

        let mut out = Vec::new();
        for event in self.events.drain() {
            match event {
                CollisionEvent::Stopped(a, b, flags) => {
                    // Removal of an intersecting collider also reports
                    // Stopped; that is not a ball leaving the arena.
                    if flags.contains(CollisionEventFlags::REMOVED) {
                        continue;
                    }
                    let Some(other) = self.across_boundary(a, b) else {
                        continue;
                    };
                    if self.tags.get(&other) != Some(&Tag::Ball) {
                        continue;
                    }
                    if let Some((x, y)) = self.collider_position(other) {
                        out.push(PhysicsEvent::BoundaryExit { ball: other, x, y });
                    }
                }
                CollisionEvent::Started(a, b, flags) => {
                    if flags.contains(CollisionEventFlags::SENSOR) {
                        continue;
                    }
                    if let Some((ball, paddle)) = self.ball_paddle_pair(a, b) {
                        out.push(PhysicsEvent::PaddleHit { ball, paddle });
                    }
                }
            }
        }
        out
    }

    fn across_boundary(&self, a: ColliderHandle, b: ColliderHandle) -> Option<ColliderHandle> {
        match (self.tags.get(&a), self.tags.get(&b)) {
            (Some(Tag::Boundary), _) => Some(b),
            (_, Some(Tag::Boundary)) => Some(a),
            _ => None,
        }
    }

    fn ball_paddle_pair(
        &self,
        a: ColliderHandle,
        b: ColliderHandle,
    ) -> Option<(ColliderHandle, ColliderHandle)> {
        match (self.tags.get(&a), self.tags.get(&b)) {
            (Some(Tag::Ball), Some(Tag::Paddle)) => Some((a, b)),
            (Some(Tag::Paddle), Some(Tag::Ball)) => Some((b, a)),
            _ => None,
        }
    }

    fn collider_position(&self, handle: ColliderHandle) -> Option<(f32, f32)> {
        let body = self
            .colliders
            .get(handle)
            .and_then(|collider| collider.parent())
            .and_then(|parent| self.bodies.get(parent))?;
        let pos = body.translation();
        Some((pos.x, pos.y))
    }
}
