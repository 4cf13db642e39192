use crate::hsv::HsvRange;

/// Hue values at which a profile's color straddles the red/magenta boundary.
///
/// Calibration splits the sampled range in two when the sampled hue is at or
/// below `low_max`, or at or above `high_min` when that is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HueWrap {
    pub low_max: u8,
    pub high_min: Option<u8>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorProfile {
    pub name: String,
    pub primary: HsvRange,
    /// Second hue band for colors that wrap around hue zero.
    pub secondary: Option<HsvRange>,
    pub hue_wrap: Option<HueWrap>,
}

impl ColorProfile {
    pub fn new(name: impl Into<String>, primary: HsvRange) -> Self {
        Self {
            name: name.into(),
            primary,
            secondary: None,
            hue_wrap: None,
        }
    }

    pub fn with_secondary(mut self, secondary: HsvRange) -> Self {
        self.secondary = Some(secondary);
        self
    }

    pub fn with_hue_wrap(mut self, low_max: u8, high_min: Option<u8>) -> Self {
        self.hue_wrap = Some(HueWrap { low_max, high_min });
        self
    }

    /// Membership test against the primary range OR'd with the secondary range.
    pub fn matches(&self, hsv: [u8; 3]) -> bool {
        self.primary.contains(hsv) || self.secondary.is_some_and(|range| range.contains(hsv))
    }
}

/// The set of color profiles the tracker detects, keyed by unique name.
///
/// Built once at startup and handed to the tracker; calibration mutates it in
/// place and the settings store persists it explicitly.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ColorTable {
    profiles: Vec<ColorProfile>,
}

impl Default for ColorTable {
    fn default() -> Self {
        Self::starter()
    }
}

impl ColorTable {
    /// The default ball colors.
    pub fn starter() -> Self {
        Self {
            profiles: vec![
                ColorProfile::new("pink", HsvRange::new([150, 150, 90], [170, 255, 255]))
                    .with_hue_wrap(10, Some(170)),
                ColorProfile::new("orange", HsvRange::new([5, 150, 120], [15, 255, 255]))
                    .with_hue_wrap(15, None),
                ColorProfile::new("green", HsvRange::new([45, 120, 70], [75, 255, 255])),
                ColorProfile::new("yellow", HsvRange::new([25, 120, 100], [35, 255, 255])),
            ],
        }
    }

    pub fn empty() -> Self {
        Self {
            profiles: Vec::new(),
        }
    }

    /// Default profile for `name` when it belongs to the starter set.
    pub fn starter_profile(name: &str) -> Option<ColorProfile> {
        Self::starter().profiles.into_iter().find(|p| p.name == name)
    }

    pub fn get(&self, name: &str) -> Option<&ColorProfile> {
        self.profiles.iter().find(|p| p.name == name)
    }

    pub fn get_mut(&mut self, name: &str) -> Option<&mut ColorProfile> {
        self.profiles.iter_mut().find(|p| p.name == name)
    }

    /// Insert or replace by name, keeping names unique and order stable.
    pub fn upsert(&mut self, profile: ColorProfile) {
        match self.get_mut(&profile.name) {
            Some(existing) => *existing = profile,
            None => self.profiles.push(profile),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &ColorProfile> {
        self.profiles.iter()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.profiles.iter().map(|p| p.name.as_str())
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}
