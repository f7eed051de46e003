//! Temporal scene memory
//!
//! Tracks object instances across frames by class, center distance and
//! box size; keeps a stability score describing how much the set of
//! visible classes changes between frames; and remembers which kinds of
//! environment have been visited and for how long.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt;

use chrono::{DateTime, Duration, Utc};
use log::{debug, trace};
use serde::{Deserialize, Serialize};

use crate::common::{BoundingBox, Detection, Point2D};

/// Minimum per-class counts that identify an environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentSignature {
    pub name: String,
    pub min_counts: BTreeMap<String, usize>,
}

impl EnvironmentSignature {
    pub fn new(name: &str, min_counts: &[(&str, usize)]) -> Self {
        Self {
            name: name.to_string(),
            min_counts: min_counts
                .iter()
                .map(|(class, n)| (class.to_string(), *n))
                .collect(),
        }
    }
}

/// Configuration for scene memory
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneMemoryConfig {
    /// How long disappeared objects and trajectories are remembered
    pub memory_duration_minutes: i64,
    pub max_tracking_objects: usize,
    /// Detections below this are ignored by tracking and change analysis
    pub min_detection_confidence: f32,
    pub match_threshold: f32,
    /// Center distance at which the distance score reaches zero
    pub match_distance_px: f64,
    /// Weight of the distance score; the size ratio gets the rest
    pub distance_weight: f32,
    pub disappearance_timeout_s: i64,
    /// Detections below this are ignored by environment classification
    pub environment_confidence: f32,
    /// Gaps at least this long do not count as time spent
    pub environment_gap_s: i64,
    /// Trajectory points kept per object
    pub trajectory_cap: usize,
    /// Environments in priority order; ties go to the earlier entry
    pub environment_signatures: Vec<EnvironmentSignature>,
}

impl Default for SceneMemoryConfig {
    fn default() -> Self {
        Self {
            memory_duration_minutes: 30,
            max_tracking_objects: 50,
            min_detection_confidence: 0.6,
            match_threshold: 0.5,
            match_distance_px: 200.0,
            distance_weight: 0.7,
            disappearance_timeout_s: 10,
            environment_confidence: 0.7,
            environment_gap_s: 300,
            trajectory_cap: 100,
            environment_signatures: vec![
                EnvironmentSignature::new("computer_lab", &[("monitor", 2), ("office-chair", 1)]),
                EnvironmentSignature::new("study_area", &[("table", 1), ("office-chair", 1)]),
                EnvironmentSignature::new("reading_area", &[("books", 1)]),
                EnvironmentSignature::new("presentation_room", &[("whiteboard", 1)]),
                EnvironmentSignature::new("corridor", &[]),
            ],
        }
    }
}

/// One object instance followed across frames
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedObject {
    pub id: String,
    pub class_name: String,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub confidence: f32,
    pub bbox: BoundingBox,
    pub frame_position: String,
    /// Frames in which the object was seen
    pub stability_count: u32,
    seq: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPoint {
    pub timestamp: DateTime<Utc>,
    pub position: Point2D,
    pub bbox: BoundingBox,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentRecord {
    pub first_encountered: DateTime<Utc>,
    pub visit_count: u32,
    pub typical_objects: BTreeMap<String, u32>,
    pub time_spent_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneChangeLevel {
    Initial,
    Stable,
    Minor,
    Moderate,
    Major,
}

impl SceneChangeLevel {
    pub fn from_ratio(change_ratio: f32) -> Self {
        if change_ratio == 0.0 {
            SceneChangeLevel::Stable
        } else if change_ratio < 0.3 {
            SceneChangeLevel::Minor
        } else if change_ratio < 0.7 {
            SceneChangeLevel::Moderate
        } else {
            SceneChangeLevel::Major
        }
    }
}

impl fmt::Display for SceneChangeLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SceneChangeLevel::Initial => "initial",
            SceneChangeLevel::Stable => "stable",
            SceneChangeLevel::Minor => "minor",
            SceneChangeLevel::Moderate => "moderate",
            SceneChangeLevel::Major => "major",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingSummary {
    pub new_objects: usize,
    pub matched_objects: usize,
    pub disappeared_objects: usize,
    pub total_tracked: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneAnalysis {
    pub change_level: SceneChangeLevel,
    pub added_objects: Vec<String>,
    pub removed_objects: Vec<String>,
    pub stability_score: f32,
    pub new_scene: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnvironmentUpdate {
    pub current_environment: String,
    /// Visits to the current environment so far
    pub familiarity: u32,
    pub time_spent_s: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryStats {
    pub tracked_objects: usize,
    pub disappeared_objects: usize,
    pub trajectories: usize,
    pub environments_known: usize,
    pub scene_stability: f32,
    pub current_environment: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneMemoryUpdate {
    pub tracking: TrackingSummary,
    pub scene_analysis: SceneAnalysis,
    pub environment: EnvironmentUpdate,
    pub stats: MemoryStats,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StableObject {
    pub object_id: String,
    pub class_name: String,
    pub stability_count: u32,
    pub confidence: f32,
    pub duration_tracked_s: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementType {
    Stationary,
    MinorMovement,
    Mobile,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MovementPattern {
    pub movement_type: MovementType,
    pub total_distance: f64,
    pub trajectory_points: usize,
    pub class_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SceneContext {
    pub current_stability: f32,
    pub stable_objects: Vec<StableObject>,
    pub movement_patterns: BTreeMap<String, MovementPattern>,
    pub environment_history: BTreeMap<String, EnvironmentRecord>,
    pub stats: MemoryStats,
}

/// Scene memory system
#[derive(Debug, Clone)]
pub struct SceneMemorySystem {
    config: SceneMemoryConfig,
    tracked: BTreeMap<String, TrackedObject>,
    disappeared: BTreeMap<String, TrackedObject>,
    trajectories: HashMap<String, VecDeque<TrajectoryPoint>>,
    environments: BTreeMap<String, EnvironmentRecord>,
    previous_classes: Option<BTreeSet<String>>,
    stability: f32,
    last_env_timestamp: Option<DateTime<Utc>>,
    current_environment: Option<String>,
    next_id: u64,
}

impl Default for SceneMemorySystem {
    fn default() -> Self {
        Self::new(SceneMemoryConfig::default())
    }
}

impl SceneMemorySystem {
    pub fn new(config: SceneMemoryConfig) -> Self {
        SceneMemorySystem {
            config,
            tracked: BTreeMap::new(),
            disappeared: BTreeMap::new(),
            trajectories: HashMap::new(),
            environments: BTreeMap::new(),
            previous_classes: None,
            stability: 1.0,
            last_env_timestamp: None,
            current_environment: None,
            next_id: 0,
        }
    }

    pub fn config(&self) -> &SceneMemoryConfig {
        &self.config
    }

    /// Current stability score in [0, 1]
    pub fn stability(&self) -> f32 {
        self.stability
    }

    pub fn tracked_objects(&self) -> &BTreeMap<String, TrackedObject> {
        &self.tracked
    }

    pub fn disappeared_objects(&self) -> &BTreeMap<String, TrackedObject> {
        &self.disappeared
    }

    pub fn trajectory(&self, id: &str) -> Option<&VecDeque<TrajectoryPoint>> {
        self.trajectories.get(id)
    }

    pub fn environment_history(&self) -> &BTreeMap<String, EnvironmentRecord> {
        &self.environments
    }

    pub fn current_environment(&self) -> Option<&str> {
        self.current_environment.as_deref()
    }

    pub fn update_scene_memory(
        &mut self,
        detections: &[Detection],
        timestamp: DateTime<Utc>,
    ) -> SceneMemoryUpdate {
        let tracking = self.update_tracking(detections, timestamp);
        let scene_analysis = self.analyze_scene_changes(detections);
        let environment = self.update_environment_memory(detections, timestamp);
        self.cleanup(timestamp);

        debug!(
            "Scene memory: {} tracked, change {}, stability {:.2}, environment {}",
            tracking.total_tracked,
            scene_analysis.change_level,
            self.stability,
            environment.current_environment
        );

        SceneMemoryUpdate {
            tracking,
            scene_analysis,
            environment,
            stats: self.memory_stats(),
        }
    }

    fn update_tracking(&mut self, detections: &[Detection], now: DateTime<Utc>) -> TrackingSummary {
        let mut seen: BTreeSet<String> = BTreeSet::new();
        let mut new_objects = 0usize;
        let mut matched_objects = 0usize;

        for detection in detections {
            if detection.confidence < self.config.min_detection_confidence {
                continue;
            }

            let point = TrajectoryPoint {
                timestamp: now,
                position: detection.center(),
                bbox: detection.bbox,
            };

            match self.find_match(detection, &seen) {
                Some(id) => {
                    if let Some(object) = self.tracked.get_mut(&id) {
                        object.last_seen = now;
                        object.confidence = detection.confidence;
                        object.bbox = detection.bbox;
                        object.frame_position = detection.frame_position.clone();
                        object.stability_count += 1;
                    }
                    self.push_trajectory(&id, point);
                    matched_objects += 1;
                    seen.insert(id);
                }
                None => {
                    self.next_id += 1;
                    let id = format!("{}_{}", detection.class_name, self.next_id);
                    trace!("New tracked object {}", id);
                    self.tracked.insert(
                        id.clone(),
                        TrackedObject {
                            id: id.clone(),
                            class_name: detection.class_name.clone(),
                            first_seen: now,
                            last_seen: now,
                            confidence: detection.confidence,
                            bbox: detection.bbox,
                            frame_position: detection.frame_position.clone(),
                            stability_count: 1,
                            seq: self.next_id,
                        },
                    );
                    self.push_trajectory(&id, point);
                    new_objects += 1;
                    seen.insert(id);
                }
            }
        }

        let timeout = Duration::seconds(self.config.disappearance_timeout_s);
        let gone: Vec<String> = self
            .tracked
            .iter()
            .filter(|(id, o)| !seen.contains(*id) && now - o.last_seen > timeout)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &gone {
            if let Some(object) = self.tracked.remove(id) {
                trace!("Object {} disappeared", id);
                self.disappeared.insert(id.clone(), object);
            }
        }

        TrackingSummary {
            new_objects,
            matched_objects,
            disappeared_objects: gone.len(),
            total_tracked: self.tracked.len(),
        }
    }

    /// Best same-class object not yet matched in this frame
    fn find_match(&self, detection: &Detection, taken: &BTreeSet<String>) -> Option<String> {
        let mut best: Option<(&String, f32)> = None;
        for (id, object) in &self.tracked {
            if object.class_name != detection.class_name || taken.contains(id) {
                continue;
            }
            let similarity = self.similarity(&object.bbox, &detection.bbox);
            if similarity > self.config.match_threshold
                && best.map_or(true, |(_, s)| similarity > s)
            {
                best = Some((id, similarity));
            }
        }
        best.map(|(id, _)| id.clone())
    }

    /// Weighted blend of center proximity and box size ratio
    pub fn similarity(&self, a: &BoundingBox, b: &BoundingBox) -> f32 {
        let distance = a.center().distance(&b.center());
        let distance_score = (1.0 - distance / self.config.match_distance_px).max(0.0) as f32;
        let (area_a, area_b) = (a.area(), b.area());
        let size_ratio = if area_a.max(area_b) > 0.0 {
            (area_a.min(area_b) / area_a.max(area_b)) as f32
        } else {
            1.0
        };
        let w = self.config.distance_weight;
        w * distance_score + (1.0 - w) * size_ratio
    }

    fn push_trajectory(&mut self, id: &str, point: TrajectoryPoint) {
        let cap = self.config.trajectory_cap.max(1);
        let trajectory = self.trajectories.entry(id.to_string()).or_default();
        trajectory.push_back(point);
        while trajectory.len() > cap {
            trajectory.pop_front();
        }
    }

    fn analyze_scene_changes(&mut self, detections: &[Detection]) -> SceneAnalysis {
        let current: BTreeSet<String> = detections
            .iter()
            .filter(|d| d.confidence > self.config.min_detection_confidence)
            .map(|d| d.class_name.clone())
            .collect();

        let Some(previous) = self.previous_classes.replace(current.clone()) else {
            return SceneAnalysis {
                change_level: SceneChangeLevel::Initial,
                added_objects: current.into_iter().collect(),
                removed_objects: Vec::new(),
                stability_score: self.stability,
                new_scene: true,
            };
        };

        let added: Vec<String> = current.difference(&previous).cloned().collect();
        let removed: Vec<String> = previous.difference(&current).cloned().collect();
        let change_ratio = (added.len() + removed.len()) as f32 / current.len().max(1) as f32;
        let change_level = SceneChangeLevel::from_ratio(change_ratio);

        self.stability = if change_level == SceneChangeLevel::Stable {
            (self.stability + 0.1).min(1.0)
        } else {
            (self.stability - 0.2).max(0.0)
        };

        SceneAnalysis {
            change_level,
            added_objects: added,
            removed_objects: removed,
            stability_score: self.stability,
            new_scene: change_ratio > 0.8,
        }
    }

    /// Highest-scoring environment signature, or `general_area`
    pub fn classify_environment(&self, classes: &[&str]) -> String {
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for class in classes {
            *counts.entry(*class).or_insert(0) += 1;
        }

        let mut best = ("general_area", 0usize);
        for signature in &self.config.environment_signatures {
            let mut score = 0usize;
            let mut complete = true;
            for (class, &min) in &signature.min_counts {
                if counts.get(class.as_str()).copied().unwrap_or(0) >= min {
                    score += min;
                } else {
                    complete = false;
                }
            }
            if complete {
                score += signature.min_counts.len();
            }
            if score > best.1 {
                best = (signature.name.as_str(), score);
            }
        }
        best.0.to_string()
    }

    fn update_environment_memory(&mut self, detections: &[Detection], now: DateTime<Utc>) -> EnvironmentUpdate {
        let classes: Vec<&str> = detections
            .iter()
            .filter(|d| d.confidence > self.config.environment_confidence)
            .map(|d| d.class_name.as_str())
            .collect();
        let environment = self.classify_environment(&classes);
        let gap_limit = Duration::seconds(self.config.environment_gap_s);
        let last = self.last_env_timestamp;

        let record = self
            .environments
            .entry(environment.clone())
            .and_modify(|r| {
                r.visit_count += 1;
                if let Some(last) = last {
                    let gap = now - last;
                    if gap < gap_limit && gap > Duration::zero() {
                        r.time_spent_s += gap.num_milliseconds() as f64 / 1000.0;
                    }
                }
            })
            .or_insert_with(|| EnvironmentRecord {
                first_encountered: now,
                visit_count: 1,
                typical_objects: BTreeMap::new(),
                time_spent_s: 0.0,
            });
        for class in &classes {
            *record.typical_objects.entry(class.to_string()).or_insert(0) += 1;
        }
        let update = EnvironmentUpdate {
            current_environment: environment.clone(),
            familiarity: record.visit_count,
            time_spent_s: record.time_spent_s,
        };

        self.last_env_timestamp = Some(now);
        self.current_environment = Some(environment);
        update
    }

    fn cleanup(&mut self, now: DateTime<Utc>) {
        let cutoff = now - Duration::minutes(self.config.memory_duration_minutes);

        let before = self.disappeared.len();
        self.disappeared.retain(|_, o| o.last_seen >= cutoff);
        if self.disappeared.len() < before {
            trace!("Purged {} expired objects", before - self.disappeared.len());
        }

        self.trajectories.retain(|_, points| {
            points.retain(|p| p.timestamp > cutoff);
            !points.is_empty()
        });

        if self.tracked.len() > self.config.max_tracking_objects {
            let excess = self.tracked.len() - self.config.max_tracking_objects;
            let mut by_stability: Vec<(u32, u64, String)> = self
                .tracked
                .values()
                .map(|o| (o.stability_count, o.seq, o.id.clone()))
                .collect();
            by_stability.sort();
            for (_, _, id) in by_stability.into_iter().take(excess) {
                self.tracked.remove(&id);
            }
            debug!("Evicted {} least-stable tracked objects", excess);
        }
    }

    pub fn memory_stats(&self) -> MemoryStats {
        MemoryStats {
            tracked_objects: self.tracked.len(),
            disappeared_objects: self.disappeared.len(),
            trajectories: self.trajectories.len(),
            environments_known: self.environments.len(),
            scene_stability: (self.stability * 100.0).round() / 100.0,
            current_environment: self.current_environment.clone(),
        }
    }

    /// Tracked objects seen in at least `min_stability` frames, most stable first
    pub fn stable_objects(&self, min_stability: u32) -> Vec<StableObject> {
        let mut objects: Vec<StableObject> = self
            .tracked
            .values()
            .filter(|o| o.stability_count >= min_stability)
            .map(|o| StableObject {
                object_id: o.id.clone(),
                class_name: o.class_name.clone(),
                stability_count: o.stability_count,
                confidence: o.confidence,
                duration_tracked_s: (o.last_seen - o.first_seen).num_milliseconds() as f64 / 1000.0,
            })
            .collect();
        objects.sort_by(|a, b| b.stability_count.cmp(&a.stability_count));
        objects
    }

    /// Movement classification for trajectories with at least 3 points
    pub fn movement_patterns(&self) -> BTreeMap<String, MovementPattern> {
        self.trajectories
            .iter()
            .filter(|(_, points)| points.len() >= 3)
            .map(|(id, points)| {
                let total_distance: f64 = points
                    .iter()
                    .zip(points.iter().skip(1))
                    .map(|(a, b)| a.position.distance(&b.position))
                    .sum();
                let movement_type = if total_distance < 20.0 {
                    MovementType::Stationary
                } else if total_distance < 100.0 {
                    MovementType::MinorMovement
                } else {
                    MovementType::Mobile
                };
                let class_name = self
                    .tracked
                    .get(id)
                    .or_else(|| self.disappeared.get(id))
                    .map_or_else(|| "unknown".to_string(), |o| o.class_name.clone());
                (
                    id.clone(),
                    MovementPattern {
                        movement_type,
                        total_distance,
                        trajectory_points: points.len(),
                        class_name,
                    },
                )
            })
            .collect()
    }

    pub fn scene_context(&self) -> SceneContext {
        SceneContext {
            current_stability: self.stability,
            stable_objects: self.stable_objects(5),
            movement_patterns: self.movement_patterns(),
            environment_history: self.environments.clone(),
            stats: self.memory_stats(),
        }
    }
}
