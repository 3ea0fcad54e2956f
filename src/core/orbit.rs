use crate::types::{PosVector, SarError, SarResult, StateVector};
use chrono::{DateTime, Utc};

/// Number of state vectors used by each Lagrange interpolation
const LAGRANGE_POINTS: usize = 6;

/// Seconds from `reference` to `time`
pub fn seconds_since(reference: DateTime<Utc>, time: DateTime<Utc>) -> f64 {
    let delta = time - reference;
    match delta.num_nanoseconds() {
        Some(ns) => ns as f64 * 1.0e-9,
        None => delta.num_milliseconds() as f64 * 1.0e-3,
    }
}

/// Sensor trajectory fitted to a sparse list of state vectors.
///
/// Times are seconds relative to the first image line. Position and velocity
/// are sampled once per image line at construction and served from that cache
/// to the zero-Doppler solver.
#[derive(Debug, Clone)]
pub struct Orbit {
    times: Vec<f64>,
    positions: Vec<PosVector>,
    velocities: Vec<PosVector>,
    /// Allowed extrapolation beyond the first/last state vector (seconds)
    margin: f64,
    line_time_interval: f64,
    line_positions: Vec<PosVector>,
    line_velocities: Vec<PosVector>,
}

impl Orbit {
    pub fn new(
        state_vectors: &[StateVector],
        first_line_time: DateTime<Utc>,
        line_time_interval: f64,
        num_lines: usize,
    ) -> SarResult<Self> {
        if state_vectors.len() < 2 {
            return Err(SarError::Metadata(format!(
                "At least 2 orbit state vectors required, got {}",
                state_vectors.len()
            )));
        }
        if !(line_time_interval > 0.0) {
            return Err(SarError::Metadata(format!(
                "Invalid line time interval: {}", line_time_interval
            )));
        }
        if num_lines == 0 {
            return Err(SarError::Metadata("Image has no lines".to_string()));
        }

        let mut sorted: Vec<&StateVector> = state_vectors.iter().collect();
        sorted.sort_by(|a, b| a.time.cmp(&b.time));

        let times: Vec<f64> = sorted
            .iter()
            .map(|sv| seconds_since(first_line_time, sv.time))
            .collect();
        if times.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SarError::Metadata(
                "Orbit state vectors must have distinct times".to_string(),
            ));
        }

        for sv in &sorted {
            let speed = PosVector::from_array(sv.velocity).norm();
            if !(6000.0..=9000.0).contains(&speed) {
                log::warn!("Unusual orbital velocity: {:.1} m/s at {}",
                          speed, sv.time.format("%Y-%m-%d %H:%M:%S"));
            }
        }

        let span = times[times.len() - 1] - times[0];
        let margin = span / (times.len() - 1) as f64;

        let mut orbit = Self {
            times,
            positions: sorted.iter().map(|sv| PosVector::from_array(sv.position)).collect(),
            velocities: sorted.iter().map(|sv| PosVector::from_array(sv.velocity)).collect(),
            margin,
            line_time_interval,
            line_positions: Vec::with_capacity(num_lines),
            line_velocities: Vec::with_capacity(num_lines),
        };

        for line in 0..num_lines {
            let (position, velocity) = orbit
                .state_at(line as f64 * line_time_interval)
                .map_err(|e| SarError::Metadata(format!(
                    "Orbit does not cover image line {}: {}", line, e
                )))?;
            orbit.line_positions.push(position);
            orbit.line_velocities.push(velocity);
        }

        log::debug!("Orbit fitted: {} state vectors, {} lines cached",
                   orbit.times.len(), num_lines);

        Ok(orbit)
    }

    /// Sensor position at `time` seconds after the first line
    pub fn position_at(&self, time: f64) -> SarResult<PosVector> {
        let start = self.window_start(time)?;
        Ok(self.lagrange(&self.positions, start, time))
    }

    /// Sensor velocity at `time` seconds after the first line
    pub fn velocity_at(&self, time: f64) -> SarResult<PosVector> {
        let start = self.window_start(time)?;
        Ok(self.lagrange(&self.velocities, start, time))
    }

    pub fn state_at(&self, time: f64) -> SarResult<(PosVector, PosVector)> {
        let start = self.window_start(time)?;
        Ok((
            self.lagrange(&self.positions, start, time),
            self.lagrange(&self.velocities, start, time),
        ))
    }

    pub fn num_lines(&self) -> usize {
        self.line_positions.len()
    }

    pub fn line_time_interval(&self) -> f64 {
        self.line_time_interval
    }

    pub fn line_position(&self, line: usize) -> PosVector {
        self.line_positions[line]
    }

    pub fn line_velocity(&self, line: usize) -> PosVector {
        self.line_velocities[line]
    }

    /// Fractional image line for a time relative to the first line
    pub fn azimuth_index(&self, time: f64) -> f64 {
        time / self.line_time_interval
    }

    /// First index of the interpolation window centred on `time`
    fn window_start(&self, time: f64) -> SarResult<usize> {
        let first = self.times[0];
        let last = self.times[self.times.len() - 1];
        if !time.is_finite() || time < first - self.margin || time > last + self.margin {
            return Err(SarError::Geometry(format!(
                "Time {:.6}s outside orbit coverage [{:.3}, {:.3}]s", time, first, last
            )));
        }

        let num_points = LAGRANGE_POINTS.min(self.times.len());
        let closest = self.times.partition_point(|&t| t < time);
        let start = closest.saturating_sub(num_points / 2);
        Ok(start.min(self.times.len() - num_points))
    }

    fn lagrange(&self, values: &[PosVector], start: usize, time: f64) -> PosVector {
        let num_points = LAGRANGE_POINTS.min(self.times.len());
        let window = start..start + num_points;

        let mut result = PosVector::default();
        for i in window.clone() {
            let ti = self.times[i];
            let mut li = 1.0;
            for j in window.clone() {
                if i != j {
                    let tj = self.times[j];
                    li *= (time - tj) / (ti - tj);
                }
            }
            result = result + values[i] * li;
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::Duration;

    fn linear_orbit(first_line: DateTime<Utc>) -> Vec<StateVector> {
        // Straight-line motion at 7 km/s starting 5 s before the first line
        (0..12)
            .map(|k| {
                let t = k as f64 - 5.0;
                StateVector {
                    time: first_line + Duration::milliseconds((t * 1000.0) as i64),
                    position: [7_078_137.0, 1000.0 * t, 7000.0 * t],
                    velocity: [0.0, 1000.0, 7000.0],
                }
            })
            .collect()
    }

    fn first_line() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2020-01-03T17:08:15Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    #[test]
    fn test_reproduces_linear_motion() {
        let orbit = Orbit::new(&linear_orbit(first_line()), first_line(), 0.1, 20).unwrap();

        let (position, velocity) = orbit.state_at(1.234).unwrap();
        assert_relative_eq!(position.x, 7_078_137.0, epsilon = 1e-6);
        assert_relative_eq!(position.y, 1234.0, epsilon = 1e-6);
        assert_relative_eq!(position.z, 8638.0, epsilon = 1e-6);
        assert_relative_eq!(velocity.z, 7000.0, epsilon = 1e-9);
    }

    #[test]
    fn test_line_cache_matches_interpolation() {
        let orbit = Orbit::new(&linear_orbit(first_line()), first_line(), 0.1, 20).unwrap();

        assert_eq!(orbit.num_lines(), 20);
        let direct = orbit.position_at(1.9).unwrap();
        assert_relative_eq!(orbit.line_position(19).z, direct.z, epsilon = 1e-6);
        assert_relative_eq!(orbit.azimuth_index(1.9), 19.0, epsilon = 1e-12);
    }

    #[test]
    fn test_rejects_queries_outside_coverage() {
        let orbit = Orbit::new(&linear_orbit(first_line()), first_line(), 0.1, 20).unwrap();

        assert!(orbit.position_at(6.5).is_ok());
        assert!(orbit.position_at(60.0).is_err());
        assert!(orbit.velocity_at(-60.0).is_err());
        assert!(orbit.position_at(f64::NAN).is_err());
    }

    #[test]
    fn test_rejects_image_outside_orbit() {
        let result = Orbit::new(&linear_orbit(first_line()), first_line(), 1.0, 100);
        assert!(matches!(result, Err(SarError::Metadata(_))));
    }

    #[test]
    fn test_rejects_duplicate_times() {
        let mut vectors = linear_orbit(first_line());
        vectors[1].time = vectors[0].time;
        assert!(Orbit::new(&vectors, first_line(), 0.1, 10).is_err());
    }
}
