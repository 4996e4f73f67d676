//! Spoken guidance from spatially tagged obstacles

use crate::config::GuidancePolicy;
use sightline_core::{Direction, Obstacle};

pub const CLEAR_PATH: &str = "Path is clear, continue straight ahead";
pub const NO_OBJECTS: &str = "No objects detected";

/// Builds the sentence spoken to the user
#[derive(Debug, Clone, Default)]
pub struct GuidanceGenerator {
    policy: GuidancePolicy,
}

impl GuidanceGenerator {
    pub fn new(policy: GuidancePolicy) -> Self {
        Self { policy }
    }

    /// Navigation instruction for the obstacles currently in range.
    ///
    /// Clauses come in a fixed order: the turn instruction for an obstacle
    /// ahead, then the left warning, then the right warning.
    pub fn generate_instruction(&self, obstacles: &[Obstacle]) -> String {
        if obstacles.is_empty() {
            return CLEAR_PATH.to_string();
        }

        let mut clauses = Vec::new();

        if let Some(closest) = closest_in(obstacles, Direction::Ahead) {
            if closest.distance_m < self.policy.turn_distance_m {
                let left = count_in(obstacles, Direction::Left);
                let right = count_in(obstacles, Direction::Right);
                let turn = if left < right { Direction::Left } else { Direction::Right };
                clauses.push(format!(
                    "Obstacle ahead at {:.1} meters, turn {}",
                    closest.distance_m, turn
                ));
            }
        }

        for side in [Direction::Left, Direction::Right] {
            if let Some(closest) = closest_in(obstacles, side) {
                if closest.distance_m < self.policy.side_warning_m {
                    clauses.push(format!(
                        "Close obstacle to your {} at {:.1} meters",
                        side, closest.distance_m
                    ));
                }
            }
        }

        if clauses.is_empty() {
            CLEAR_PATH.to_string()
        } else {
            clauses.join(". ")
        }
    }

    /// Enumeration spoken in object description mode
    pub fn describe_objects(&self, objects: &[Obstacle]) -> String {
        if objects.is_empty() {
            return NO_OBJECTS.to_string();
        }
        let listed: Vec<String> = objects
            .iter()
            .map(|o| format!("{} at {:.1}m", o.name, o.distance_m))
            .collect();
        format!("I see {}", listed.join(", "))
    }
}

fn closest_in(obstacles: &[Obstacle], direction: Direction) -> Option<&Obstacle> {
    obstacles
        .iter()
        .filter(|o| o.direction == direction)
        .min_by(|a, b| a.distance_m.total_cmp(&b.distance_m))
}

fn count_in(obstacles: &[Obstacle], direction: Direction) -> usize {
    obstacles.iter().filter(|o| o.direction == direction).count()
}
