use serde_json::{json, Value};

const FACE_LEN: usize = 478;
const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];
const RIGHT_EYE: [usize; 6] = [362, 385, 387, 263, 373, 380];

/// 478 个 MediaPipe 关键点，双眼 EAR 都等于 `ear`
pub fn face_with_ear(ear: f64) -> Value {
    let mut points = vec![(0.5_f64, 0.5_f64); FACE_LEN];
    for (eye, cx) in [(LEFT_EYE, 0.35), (RIGHT_EYE, 0.65)] {
        let half_v = ear * 0.2 / 2.0;
        points[eye[0]] = (cx - 0.1, 0.4);
        points[eye[3]] = (cx + 0.1, 0.4);
        points[eye[1]] = (cx, 0.4 - half_v);
        points[eye[5]] = (cx, 0.4 + half_v);
    }
    Value::Array(points.into_iter().map(|(x, y)| json!({ "x": x, "y": y })).collect())
}
