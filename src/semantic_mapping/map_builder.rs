//! Long-lived semantic map of the indoor environment
//!
//! Confident detections are folded into persistent object records keyed by
//! class, frame region and a coarse pixel bucket. Each frame also yields
//! pairwise spatial relationships, a zone classification and a few
//! navigation hints derived from where objects sit in the frame.

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::fmt;
use std::fs;
use std::path::Path;

use chrono::{DateTime, Utc};
use itertools::Itertools;
use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::common::{BoundingBox, Detection, NavResult};

/// A named zone and the object classes that characterize it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ZoneSignature {
    pub name: String,
    pub classes: Vec<String>,
}

impl ZoneSignature {
    pub fn new(name: &str, classes: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            classes: classes.iter().map(|c| c.to_string()).collect(),
        }
    }
}

/// Configuration for the semantic map builder
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SemanticMapConfig {
    /// Minimum confidence for persistence and zone evidence
    pub confidence_threshold: f32,
    /// Recent frames kept in memory
    pub memory_size: usize,
    /// Pixel bucket used to cluster object centers
    pub position_bucket_px: f64,
    /// Relationship log length that triggers trimming
    pub relationship_log_cap: usize,
    /// Relationships kept after trimming
    pub relationship_log_keep: usize,
    /// Relationships written by `save_map`
    pub saved_relationships: usize,
    pub close_distance_px: f64,
    pub moderate_distance_px: f64,
    pub landmark_confidence: f32,
    pub landmark_classes: Vec<String>,
    /// Per-object tracking entries kept
    pub tracking_history_cap: usize,
    /// Bounding boxes kept per persistent object
    pub bbox_history_cap: usize,
    /// Zones in priority order; ties go to the earlier entry
    pub zone_signatures: Vec<ZoneSignature>,
}

impl Default for SemanticMapConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: 0.7,
            memory_size: 100,
            position_bucket_px: 50.0,
            relationship_log_cap: 1000,
            relationship_log_keep: 500,
            saved_relationships: 50,
            close_distance_px: 100.0,
            moderate_distance_px: 200.0,
            landmark_confidence: 0.8,
            landmark_classes: ["monitor", "whiteboard", "table"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            tracking_history_cap: 50,
            bbox_history_cap: 20,
            zone_signatures: vec![
                ZoneSignature::new("study_area", &["table", "office-chair", "books"]),
                ZoneSignature::new("computer_lab", &["monitor", "office-chair", "table"]),
                ZoneSignature::new("reading_area", &["books", "office-chair"]),
                ZoneSignature::new("presentation_area", &["whiteboard", "office-chair", "table"]),
                ZoneSignature::new("circulation_area", &["books", "table"]),
                ZoneSignature::new("corridor", &[]),
            ],
        }
    }
}

/// Long-term memory of one physical object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersistentObject {
    pub class_name: String,
    /// Frame region at first sighting
    pub position: String,
    /// Running maximum of detection confidence
    pub confidence: f32,
    pub first_seen: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub frequency: u32,
    pub bbox_history: Vec<BoundingBox>,
    pub is_landmark: bool,
}

impl PersistentObject {
    pub fn last_bbox(&self) -> Option<&BoundingBox> {
        self.bbox_history.last()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RelativeDirection {
    LeftOf,
    RightOf,
    Above,
    Below,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Proximity {
    Close,
    Moderate,
    Far,
}

/// How `object1` sits relative to `object2` in the frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialRelationship {
    pub object1: String,
    pub object2: String,
    pub relationship: RelativeDirection,
    pub distance: f64,
    pub proximity: Proximity,
    pub confidence: f32,
}

/// Detection-count difficulty of the current view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SceneDifficulty {
    Easy,
    Moderate,
    Challenging,
    Difficult,
}

impl SceneDifficulty {
    pub fn from_detection_count(count: usize) -> Self {
        match count {
            0 => SceneDifficulty::Easy,
            1..=2 => SceneDifficulty::Moderate,
            3..=5 => SceneDifficulty::Challenging,
            _ => SceneDifficulty::Difficult,
        }
    }
}

impl fmt::Display for SceneDifficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SceneDifficulty::Easy => "easy",
            SceneDifficulty::Moderate => "moderate",
            SceneDifficulty::Challenging => "challenging",
            SceneDifficulty::Difficult => "difficult",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NavigationInfo {
    pub current_zone: String,
    /// Detections sitting in the center of the frame
    pub obstacle_density: usize,
    /// Subset of forward / left / right
    pub clear_paths: Vec<String>,
    pub navigation_difficulty: SceneDifficulty,
    pub recommended_direction: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Accessibility {
    pub mobility_friendly: bool,
    pub obstacle_count: usize,
    /// wide, moderate or narrow
    pub clear_width: String,
    /// low or high
    pub complexity: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SemanticContext {
    pub zone_type: String,
    pub furniture_count: usize,
    pub technology_count: usize,
    pub educational_count: usize,
    pub scene_density: usize,
    pub predominant_objects: Vec<String>,
    pub accessibility: Accessibility,
    pub landmark_objects: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpatialMemorySummary {
    pub persistent_objects: usize,
    pub tracked_relationships: usize,
    pub memory_frames: usize,
    pub most_common_objects: Vec<(String, u32)>,
    pub landmark_count: usize,
}

/// Outcome of one `update_map` call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MapUpdate {
    pub frame_id: String,
    pub zone_type: String,
    pub persistent_objects: usize,
    pub navigation_info: NavigationInfo,
    pub semantic_context: SemanticContext,
    pub spatial_memory: SpatialMemorySummary,
}

#[derive(Debug, Clone)]
struct FrameRecord {
    frame_id: String,
    timestamp: DateTime<Utc>,
    detections: Vec<Detection>,
    location_hint: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingEntry {
    pub frame_id: String,
    pub bbox: BoundingBox,
    pub position: String,
    pub timestamp: DateTime<Utc>,
}

/// Whole-document persisted form of the map
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NavigationMap {
    pub persistent_objects: BTreeMap<String, PersistentObject>,
    pub spatial_relationships: Vec<SpatialRelationship>,
    pub object_frequency: BTreeMap<String, u32>,
    pub last_updated: DateTime<Utc>,
}

/// Semantic map builder
#[derive(Debug, Clone)]
pub struct SemanticMapBuilder {
    config: SemanticMapConfig,
    persistent_objects: BTreeMap<String, PersistentObject>,
    object_frequency: BTreeMap<String, u32>,
    recent_frames: VecDeque<FrameRecord>,
    tracking_history: HashMap<String, VecDeque<TrackingEntry>>,
    spatial_relationships: Vec<SpatialRelationship>,
    frame_counter: u64,
}

impl Default for SemanticMapBuilder {
    fn default() -> Self {
        Self::new(SemanticMapConfig::default())
    }
}

impl SemanticMapBuilder {
    pub fn new(config: SemanticMapConfig) -> Self {
        SemanticMapBuilder {
            config,
            persistent_objects: BTreeMap::new(),
            object_frequency: BTreeMap::new(),
            recent_frames: VecDeque::new(),
            tracking_history: HashMap::new(),
            spatial_relationships: Vec::new(),
            frame_counter: 0,
        }
    }

    pub fn config(&self) -> &SemanticMapConfig {
        &self.config
    }

    pub fn persistent_objects(&self) -> &BTreeMap<String, PersistentObject> {
        &self.persistent_objects
    }

    pub fn object_frequency(&self) -> &BTreeMap<String, u32> {
        &self.object_frequency
    }

    pub fn spatial_relationships(&self) -> &[SpatialRelationship] {
        &self.spatial_relationships
    }

    pub fn tracking_history(&self, key: &str) -> Option<&VecDeque<TrackingEntry>> {
        self.tracking_history.get(key)
    }

    pub fn recent_frame_count(&self) -> usize {
        self.recent_frames.len()
    }

    /// Detections of the most recent remembered frame
    pub fn last_frame_detections(&self) -> Option<&[Detection]> {
        self.recent_frames.back().map(|f| f.detections.as_slice())
    }

    /// Location hints of remembered frames, oldest first
    pub fn recent_location_hints(&self) -> impl Iterator<Item = (&str, &str)> + '_ {
        self.recent_frames.iter().filter_map(|f| {
            f.location_hint
                .as_deref()
                .map(|hint| (f.frame_id.as_str(), hint))
        })
    }

    pub fn update_map(
        &mut self,
        detections: &[Detection],
        frame_id: Option<&str>,
        location_hint: Option<&str>,
    ) -> MapUpdate {
        self.update_map_at(detections, frame_id, location_hint, Utc::now())
    }

    /// Same as [`update_map`](Self::update_map) with an explicit clock
    pub fn update_map_at(
        &mut self,
        detections: &[Detection],
        frame_id: Option<&str>,
        location_hint: Option<&str>,
        now: DateTime<Utc>,
    ) -> MapUpdate {
        self.frame_counter += 1;
        let frame_id = match frame_id {
            Some(id) => id.to_string(),
            None => format!("frame_{}_{}", now.format("%Y%m%d_%H%M%S_%6f"), self.frame_counter),
        };

        if self.recent_frames.len() >= self.config.memory_size.max(1) {
            self.recent_frames.pop_front();
        }
        self.recent_frames.push_back(FrameRecord {
            frame_id: frame_id.clone(),
            timestamp: now,
            detections: detections.to_vec(),
            location_hint: location_hint.map(str::to_string),
        });

        self.update_persistent_objects(detections, &frame_id, now);
        self.analyze_spatial_context(detections);
        let zone_type = self.classify_zone(detections);
        let navigation_info = self.navigation_info(detections, &zone_type);
        let semantic_context = self.semantic_context(detections, &zone_type);

        debug!(
            "Semantic map updated: frame {}, zone {}, {} persistent objects",
            frame_id,
            zone_type,
            self.persistent_objects.len()
        );

        MapUpdate {
            frame_id,
            zone_type,
            persistent_objects: self.persistent_objects.len(),
            navigation_info,
            semantic_context,
            spatial_memory: self.spatial_memory_summary(),
        }
    }

    fn update_persistent_objects(&mut self, detections: &[Detection], frame_id: &str, now: DateTime<Utc>) {
        for detection in detections {
            if detection.confidence < self.config.confidence_threshold {
                continue;
            }
            let key = self.object_key(detection);
            let landmark = self.is_landmark(detection);
            let bbox_cap = self.config.bbox_history_cap.max(1);

            match self.persistent_objects.get_mut(&key) {
                Some(object) => {
                    object.confidence = object.confidence.max(detection.confidence);
                    object.last_seen = now;
                    object.frequency += 1;
                    object.is_landmark |= landmark;
                    object.bbox_history.push(detection.bbox);
                    if object.bbox_history.len() > bbox_cap {
                        let excess = object.bbox_history.len() - bbox_cap;
                        object.bbox_history.drain(..excess);
                    }
                }
                None => {
                    self.persistent_objects.insert(
                        key.clone(),
                        PersistentObject {
                            class_name: detection.class_name.clone(),
                            position: detection.frame_position.clone(),
                            confidence: detection.confidence,
                            first_seen: now,
                            last_seen: now,
                            frequency: 1,
                            bbox_history: vec![detection.bbox],
                            is_landmark: landmark,
                        },
                    );
                }
            }

            *self
                .object_frequency
                .entry(detection.class_name.clone())
                .or_insert(0) += 1;

            let history = self.tracking_history.entry(key).or_default();
            history.push_back(TrackingEntry {
                frame_id: frame_id.to_string(),
                bbox: detection.bbox,
                position: detection.frame_position.clone(),
                timestamp: now,
            });
            while history.len() > self.config.tracking_history_cap.max(1) {
                history.pop_front();
            }
        }
    }

    /// `class_region_bx_by` with the center quantized to the pixel bucket
    pub fn object_key(&self, detection: &Detection) -> String {
        let bucket = self.config.position_bucket_px;
        let center = detection.center();
        let bx = ((center.x / bucket).floor() * bucket) as i64;
        let by = ((center.y / bucket).floor() * bucket) as i64;
        format!(
            "{}_{}_{}_{}",
            detection.class_name, detection.frame_position, bx, by
        )
    }

    pub fn is_landmark(&self, detection: &Detection) -> bool {
        let large = detection.relative_size == "large";
        let landmark_class = self
            .config
            .landmark_classes
            .iter()
            .any(|c| *c == detection.class_name);
        detection.confidence > self.config.landmark_confidence && (large || landmark_class)
    }

    fn analyze_spatial_context(&mut self, detections: &[Detection]) {
        if detections.len() < 2 {
            return;
        }
        let relationships: Vec<SpatialRelationship> = detections
            .iter()
            .tuple_combinations()
            .map(|(a, b)| self.relationship(a, b))
            .collect();
        self.spatial_relationships.extend(relationships);

        if self.spatial_relationships.len() > self.config.relationship_log_cap {
            let keep = self.config.relationship_log_keep.min(self.spatial_relationships.len());
            let drop = self.spatial_relationships.len() - keep;
            self.spatial_relationships.drain(..drop);
        }
    }

    /// Relationship of `a` relative to `b` by the dominant axis
    pub fn relationship(&self, a: &Detection, b: &Detection) -> SpatialRelationship {
        let ca = a.center();
        let cb = b.center();
        let dx = ca.x - cb.x;
        let dy = ca.y - cb.y;
        let distance = ca.distance(&cb);

        // Image y grows downward
        let relationship = if dx.abs() > dy.abs() {
            if dx > 0.0 {
                RelativeDirection::RightOf
            } else {
                RelativeDirection::LeftOf
            }
        } else if dy > 0.0 {
            RelativeDirection::Below
        } else {
            RelativeDirection::Above
        };

        let proximity = if distance < self.config.close_distance_px {
            Proximity::Close
        } else if distance < self.config.moderate_distance_px {
            Proximity::Moderate
        } else {
            Proximity::Far
        };

        SpatialRelationship {
            object1: a.class_name.clone(),
            object2: b.class_name.clone(),
            relationship,
            distance,
            proximity,
            confidence: (a.confidence + b.confidence) / 2.0,
        }
    }

    /// Highest-scoring zone signature, or `general_area`
    ///
    /// Score is the number of confident detections whose class belongs to
    /// the signature, plus the signature size when every class is present.
    pub fn classify_zone(&self, detections: &[Detection]) -> String {
        let counts = detections
            .iter()
            .filter(|d| d.confidence > self.config.confidence_threshold)
            .map(|d| d.class_name.as_str())
            .counts();

        let mut best: Option<(&str, usize)> = None;
        for zone in &self.config.zone_signatures {
            let mut score: usize = zone
                .classes
                .iter()
                .map(|c| counts.get(c.as_str()).copied().unwrap_or(0))
                .sum();
            if zone.classes.iter().all(|c| counts.contains_key(c.as_str())) {
                score += zone.classes.len();
            }
            if best.map_or(true, |(_, s)| score > s) {
                best = Some((zone.name.as_str(), score));
            }
        }

        match best {
            Some((name, score)) if score > 0 => name.to_string(),
            _ => "general_area".to_string(),
        }
    }

    /// forward / left / right not blocked by any detection's frame region
    pub fn clear_paths(detections: &[Detection]) -> Vec<String> {
        let occupied = |region: &str| detections.iter().any(|d| d.frame_position == region);
        let mut paths = Vec::new();
        if !occupied("center") {
            paths.push("forward".to_string());
        }
        if !occupied("left") && !occupied("center-left") {
            paths.push("left".to_string());
        }
        if !occupied("right") && !occupied("center-right") {
            paths.push("right".to_string());
        }
        paths
    }

    pub fn recommended_direction(clear_paths: &[String]) -> &'static str {
        let has = |p: &str| clear_paths.iter().any(|c| c == p);
        if has("forward") {
            "continue_forward"
        } else if has("left") {
            "move_left"
        } else if has("right") {
            "move_right"
        } else {
            "proceed_carefully"
        }
    }

    fn navigation_info(&self, detections: &[Detection], zone_type: &str) -> NavigationInfo {
        let clear_paths = Self::clear_paths(detections);
        let recommended_direction = Self::recommended_direction(&clear_paths).to_string();
        NavigationInfo {
            current_zone: zone_type.to_string(),
            obstacle_density: detections
                .iter()
                .filter(|d| d.frame_position == "center")
                .count(),
            clear_paths,
            navigation_difficulty: SceneDifficulty::from_detection_count(detections.len()),
            recommended_direction,
        }
    }

    fn semantic_context(&self, detections: &[Detection], zone_type: &str) -> SemanticContext {
        let count_of = |classes: &[&str]| {
            detections
                .iter()
                .filter(|d| classes.contains(&d.class_name.as_str()))
                .count()
        };

        let center_obstacles = detections
            .iter()
            .filter(|d| d.frame_position.contains("center"))
            .count();
        let left = detections.iter().any(|d| d.frame_position.contains("left"));
        let right = detections.iter().any(|d| d.frame_position.contains("right"));
        let clear_width = match (left, right) {
            (false, false) => "wide",
            (true, true) => "narrow",
            _ => "moderate",
        };

        SemanticContext {
            zone_type: zone_type.to_string(),
            furniture_count: count_of(&["table", "office-chair"]),
            technology_count: count_of(&["monitor", "tv"]),
            educational_count: count_of(&["books", "whiteboard"]),
            scene_density: detections.len(),
            predominant_objects: predominant_objects(detections, 3),
            accessibility: Accessibility {
                mobility_friendly: center_obstacles == 0,
                obstacle_count: center_obstacles,
                clear_width: clear_width.to_string(),
                complexity: if detections.len() <= 3 { "low" } else { "high" }.to_string(),
            },
            landmark_objects: detections
                .iter()
                .filter(|d| self.is_landmark(d))
                .map(|d| d.class_name.clone())
                .collect(),
        }
    }

    pub fn spatial_memory_summary(&self) -> SpatialMemorySummary {
        let most_common_objects = self
            .object_frequency
            .iter()
            .map(|(name, count)| (name.clone(), *count))
            .sorted_by(|a, b| b.1.cmp(&a.1))
            .take(5)
            .collect();

        SpatialMemorySummary {
            persistent_objects: self.persistent_objects.len(),
            tracked_relationships: self.spatial_relationships.len(),
            memory_frames: self.recent_frames.len(),
            most_common_objects,
            landmark_count: self
                .persistent_objects
                .values()
                .filter(|o| o.is_landmark)
                .count(),
        }
    }

    /// Snapshot for persistence; only the most recent relationships are kept
    pub fn navigation_map(&self) -> NavigationMap {
        let keep = self.config.saved_relationships.min(self.spatial_relationships.len());
        let start = self.spatial_relationships.len() - keep;
        NavigationMap {
            persistent_objects: self.persistent_objects.clone(),
            spatial_relationships: self.spatial_relationships[start..].to_vec(),
            object_frequency: self.object_frequency.clone(),
            last_updated: self
                .recent_frames
                .back()
                .map_or_else(Utc::now, |f| f.timestamp),
        }
    }

    pub fn save_map<P: AsRef<Path>>(&self, path: P) -> NavResult<()> {
        let json = serde_json::to_string_pretty(&self.navigation_map())?;
        fs::write(path.as_ref(), json)?;
        info!("Semantic map saved to {}", path.as_ref().display());
        Ok(())
    }

    /// Replace objects, relationships and frequencies with a saved map
    pub fn load_map<P: AsRef<Path>>(&mut self, path: P) -> NavResult<()> {
        let content = fs::read_to_string(path.as_ref())?;
        let map: NavigationMap = serde_json::from_str(&content)?;
        self.persistent_objects = map.persistent_objects;
        self.spatial_relationships = map.spatial_relationships;
        self.object_frequency = map.object_frequency;
        info!(
            "Semantic map loaded from {} ({} objects)",
            path.as_ref().display(),
            self.persistent_objects.len()
        );
        Ok(())
    }
}

/// Most frequent classes, ties in order of first appearance
fn predominant_objects(detections: &[Detection], n: usize) -> Vec<String> {
    let counts = detections.iter().map(|d| d.class_name.as_str()).counts();
    detections
        .iter()
        .map(|d| d.class_name.as_str())
        .unique()
        .sorted_by(|a, b| counts[b].cmp(&counts[a]))
        .take(n)
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn det(class: &str, conf: f32, cx: f64, cy: f64, position: &str, size: &str) -> Detection {
        Detection::new(
            class,
            conf,
            BoundingBox::new(cx - 20.0, cy - 20.0, cx + 20.0, cy + 20.0),
            position,
            size,
        )
    }

    fn lab_scene() -> Vec<Detection> {
        vec![
            det("monitor", 0.92, 320.0, 240.0, "center", "large"),
            det("office-chair", 0.85, 150.0, 400.0, "bottom-left", "medium"),
            det("table", 0.88, 500.0, 300.0, "right", "large"),
        ]
    }

    #[test]
    fn test_zone_classification_is_deterministic() {
        let builder = SemanticMapBuilder::default();
        let scene = lab_scene();
        for _ in 0..5 {
            assert_eq!(builder.classify_zone(&scene), "computer_lab");
        }
        assert_eq!(builder.classify_zone(&[]), "general_area");

        let low = vec![det("books", 0.5, 10.0, 10.0, "left", "small")];
        assert_eq!(builder.classify_zone(&low), "general_area");
    }

    #[test]
    fn test_zone_tie_goes_to_first_signature() {
        let builder = SemanticMapBuilder::default();
        // books + chair: study_area 2, reading_area 2 + 2 bonus
        let scene = vec![
            det("books", 0.9, 10.0, 10.0, "left", "small"),
            det("office-chair", 0.9, 100.0, 10.0, "center", "medium"),
        ];
        assert_eq!(builder.classify_zone(&scene), "reading_area");
        // a lone table: study, computer, presentation and circulation all score 1
        let scene = vec![det("table", 0.9, 10.0, 10.0, "left", "large")];
        assert_eq!(builder.classify_zone(&scene), "study_area");
    }

    #[test]
    fn test_persistent_objects_merge_by_bucket() {
        let mut builder = SemanticMapBuilder::default();
        let t0 = Utc::now();
        builder.update_map_at(&[det("table", 0.8, 510.0, 310.0, "right", "large")], None, None, t0);
        builder.update_map_at(
            &[det("table", 0.9, 520.0, 320.0, "right", "large")],
            None,
            None,
            t0 + Duration::seconds(1),
        );
        builder.update_map_at(&[det("table", 0.6, 520.0, 320.0, "right", "large")], None, None, t0);

        assert_eq!(builder.persistent_objects().len(), 1);
        let (key, object) = builder.persistent_objects().iter().next().unwrap();
        assert_eq!(key, "table_right_500_300");
        assert_eq!(object.frequency, 2);
        assert!((object.confidence - 0.9).abs() < 1e-6);
        assert!(object.is_landmark);
        assert_eq!(object.last_seen, t0 + Duration::seconds(1));
        assert_eq!(object.bbox_history.len(), 2);
        assert_eq!(builder.object_frequency()["table"], 2);
        assert_eq!(builder.tracking_history(key).unwrap().len(), 2);
    }

    #[test]
    fn test_landmark_rules() {
        let builder = SemanticMapBuilder::default();
        assert!(builder.is_landmark(&det("books", 0.85, 0.0, 0.0, "left", "large")));
        assert!(builder.is_landmark(&det("monitor", 0.85, 0.0, 0.0, "left", "small")));
        assert!(!builder.is_landmark(&det("monitor", 0.8, 0.0, 0.0, "left", "small")));
        assert!(!builder.is_landmark(&det("books", 0.95, 0.0, 0.0, "left", "medium")));
    }

    #[test]
    fn test_relationship_direction_and_proximity() {
        let builder = SemanticMapBuilder::default();
        let a = det("monitor", 0.9, 300.0, 100.0, "center", "");
        let b = det("table", 0.7, 100.0, 120.0, "left", "");
        let rel = builder.relationship(&a, &b);
        assert_eq!(rel.relationship, RelativeDirection::RightOf);
        assert_eq!(rel.proximity, Proximity::Far);
        assert!((rel.confidence - 0.8).abs() < 1e-6);

        let c = det("books", 0.9, 110.0, 190.0, "left", "");
        let rel = builder.relationship(&c, &b);
        assert_eq!(rel.relationship, RelativeDirection::Below);
        assert_eq!(rel.proximity, Proximity::Close);
    }

    #[test]
    fn test_relationship_log_is_trimmed() {
        let mut builder = SemanticMapBuilder::default();
        // 10 detections -> 45 pairs per frame
        let scene: Vec<Detection> = (0..10)
            .map(|i| det("books", 0.9, i as f64 * 30.0, 50.0, "left", ""))
            .collect();
        for _ in 0..23 {
            builder.update_map(&scene, None, None);
        }
        // 22 frames = 990, the 23rd crosses 1000 and trims to 500
        assert_eq!(builder.spatial_relationships().len(), 500);
        builder.update_map(&scene, None, None);
        assert_eq!(builder.spatial_relationships().len(), 545);
    }

    #[test]
    fn test_navigation_hints() {
        let mut builder = SemanticMapBuilder::default();
        let update = builder.update_map(&lab_scene(), Some("f1"), Some("Computer lab"));
        let nav = &update.navigation_info;
        assert_eq!(nav.clear_paths, vec!["left".to_string()]);
        assert_eq!(nav.recommended_direction, "move_left");
        assert_eq!(nav.navigation_difficulty, SceneDifficulty::Challenging);
        assert_eq!(nav.obstacle_density, 1);

        let ctx = &update.semantic_context;
        assert_eq!(ctx.furniture_count, 2);
        assert_eq!(ctx.technology_count, 1);
        assert_eq!(ctx.accessibility.clear_width, "narrow");
        assert!(!ctx.accessibility.mobility_friendly);
        assert_eq!(ctx.landmark_objects, vec!["monitor".to_string(), "table".to_string()]);
        assert_eq!(update.frame_id, "f1");
        assert_eq!(
            builder.recent_location_hints().collect::<Vec<_>>(),
            vec![("f1", "Computer lab")]
        );

        assert_eq!(SceneDifficulty::from_detection_count(0), SceneDifficulty::Easy);
        assert_eq!(SceneDifficulty::from_detection_count(6), SceneDifficulty::Difficult);
        assert_eq!(SemanticMapBuilder::recommended_direction(&[]), "proceed_carefully");
    }

    #[test]
    fn test_predominant_objects() {
        let scene = vec![
            det("books", 0.9, 0.0, 0.0, "left", ""),
            det("table", 0.9, 0.0, 0.0, "left", ""),
            det("table", 0.9, 0.0, 0.0, "left", ""),
            det("monitor", 0.9, 0.0, 0.0, "left", ""),
            det("tv", 0.9, 0.0, 0.0, "left", ""),
        ];
        assert_eq!(predominant_objects(&scene, 3), vec!["table", "books", "monitor"]);
    }

    #[test]
    fn test_recent_frames_are_bounded() {
        let mut builder = SemanticMapBuilder::new(SemanticMapConfig {
            memory_size: 3,
            ..Default::default()
        });
        assert!(builder.last_frame_detections().is_none());
        for _ in 0..5 {
            builder.update_map(&[], None, None);
        }
        assert_eq!(builder.recent_frame_count(), 3);

        builder.update_map(&lab_scene(), None, None);
        assert_eq!(builder.recent_frame_count(), 3);
        assert_eq!(builder.last_frame_detections(), Some(lab_scene().as_slice()));
    }

    #[test]
    fn test_save_and_load_map() {
        let mut builder = SemanticMapBuilder::default();
        builder.update_map(&lab_scene(), None, None);
        let path = std::env::temp_dir().join(format!("semantic_map_{}.json", std::process::id()));
        builder.save_map(&path).unwrap();

        let raw: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        for key in ["persistent_objects", "spatial_relationships", "object_frequency", "last_updated"] {
            assert!(raw.get(key).is_some(), "missing {}", key);
        }

        let mut restored = SemanticMapBuilder::default();
        restored.load_map(&path).unwrap();
        assert_eq!(restored.persistent_objects(), builder.persistent_objects());
        assert_eq!(restored.spatial_relationships().len(), 3);
        assert_eq!(restored.object_frequency()["monitor"], 1);
        std::fs::remove_file(&path).ok();

        assert!(restored.load_map("/nonexistent/semantic_map.json").is_err());
    }

    #[test]
    fn test_saved_map_keeps_latest_relationships() {
        let mut builder = SemanticMapBuilder::default();
        for i in 0..60 {
            let frame = vec![
                det("monitor", 0.9, 100.0, 100.0, "top-left", "medium"),
                det(&format!("crate-{}", i), 0.9, 300.0, 100.0, "top-right", "medium"),
            ];
            builder.update_map(&frame, None, None);
        }
        assert_eq!(builder.spatial_relationships().len(), 60);

        let path = std::env::temp_dir().join(format!("semantic_map_rel_{}.json", std::process::id()));
        builder.save_map(&path).unwrap();
        let mut restored = SemanticMapBuilder::default();
        restored.load_map(&path).unwrap();
        std::fs::remove_file(&path).ok();

        let saved = restored.spatial_relationships();
        assert_eq!(saved.len(), 50);
        assert_eq!(saved[0].object2, "crate-10");
        assert_eq!(saved[49].object2, "crate-59");
        assert!(saved
            .iter()
            .all(|r| r.object1 == "monitor" && r.relationship == RelativeDirection::LeftOf));
    }
}
