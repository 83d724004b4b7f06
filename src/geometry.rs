use std::f64::consts::PI;


#[derive(PartialEq, Debug, Clone)]
pub struct Point2d {
    pub x_coord: f64,
    pub y_coord: f64,
}

impl Point2d {
    pub fn new(x_coord: f64, y_coord: f64) -> Point2d {
        Point2d{x_coord, y_coord}
    }

    pub fn minus(&self, other: &Point2d) -> Point2d {
        Point2d::new(self.x_coord - other.x_coord, self.y_coord - other.y_coord)
    }

    /// Heading, in radians counter-clockwise from the x axis, of the segment from this point
    /// to `other`.
    pub fn heading_to(&self, other: &Point2d) -> f64 {
        let diff = other.minus(self);
        diff.y_coord.atan2(diff.x_coord)
    }
}

/// The signed change of heading when leaving along `out_heading` after arriving along
/// `in_heading`, wrapped into (-pi, pi].  Positive values turn left.
pub fn turn_angle(in_heading: f64, out_heading: f64) -> f64 {
    let mut angle = out_heading - in_heading;
    if angle > PI {
        angle -= 2. * PI;
    } else if angle <= -PI {
        angle += 2. * PI;
    }
    return angle;
}


#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_ulps_eq;

    #[test]
    fn test_heading() {
        let origin = Point2d::new(0., 0.);
        assert_ulps_eq!(origin.heading_to(&Point2d::new(1., 0.)), 0.);
        assert_ulps_eq!(origin.heading_to(&Point2d::new(0., 2.)), PI / 2.);
        assert_ulps_eq!(origin.heading_to(&Point2d::new(-1., 0.)), PI);
    }

    #[test]
    fn test_turn_angle_wraps() {
        // heading east, then north: a left turn
        assert_ulps_eq!(turn_angle(0., PI / 2.), PI / 2.);
        // heading east, then south: a right turn
        assert_ulps_eq!(turn_angle(0., -PI / 2.), -PI / 2.);
        // heading almost west, then almost west the other way round the circle
        assert_ulps_eq!(turn_angle(0.9 * PI, -0.9 * PI), 0.2 * PI, epsilon = 1e-12);
        assert_ulps_eq!(turn_angle(-0.9 * PI, 0.9 * PI), -0.2 * PI, epsilon = 1e-12);
    }
}
