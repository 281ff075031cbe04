use std::fmt;

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Position {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Position {
    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn distance_to(&self, other: &Position) -> f64 {
        let (dx, dy, dz) = (other.x - self.x, other.y - self.y, other.z - self.z);
        (dx * dx + dy * dy + dz * dz).sqrt()
    }

    pub fn offset(&self, dx: f64, dy: f64, dz: f64) -> Position {
        Position::new(self.x + dx, self.y + dy, self.z + dz)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// The block cell containing this point, provided every cell within
    /// `margin` of it is still addressable.
    pub fn block_within(&self, margin: u32) -> Option<BlockPos> {
        Some(BlockPos::new(
            cell(self.x, margin)?,
            cell(self.y, margin)?,
            cell(self.z, margin)?,
        ))
    }
}

fn cell(coord: f64, margin: u32) -> Option<i32> {
    let floor = coord.floor();
    let margin = f64::from(margin);
    let fits = floor.is_finite()
        && floor - margin >= f64::from(i32::MIN)
        && floor + margin <= f64::from(i32::MAX);
    fits.then_some(floor as i32)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub const fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }

    pub fn offset(&self, dx: i32, dy: i32, dz: i32) -> Option<BlockPos> {
        Some(BlockPos::new(
            self.x.checked_add(dx)?,
            self.y.checked_add(dy)?,
            self.z.checked_add(dz)?,
        ))
    }

    pub fn center(&self) -> Position {
        Position::new(
            self.x as f64 + 0.5,
            self.y as f64 + 0.5,
            self.z as f64 + 0.5,
        )
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.x, self.y, self.z)
    }
}

/// Yaw in degrees wrapped to (-180, 180]; pitch clamped to [-90, 90].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rotation {
    yaw: f32,
    pitch: f32,
}

impl Rotation {
    pub fn new(yaw: f32, pitch: f32) -> Self {
        Self {
            yaw: wrap_degrees(yaw),
            pitch: pitch.clamp(-90.0, 90.0),
        }
    }

    pub fn yaw(&self) -> f32 {
        self.yaw
    }

    pub fn pitch(&self) -> f32 {
        self.pitch
    }

    pub fn turned(&self, yaw_delta: f32, pitch_delta: f32) -> Rotation {
        Rotation::new(self.yaw + yaw_delta, self.pitch + pitch_delta)
    }
}

fn wrap_degrees(value: f32) -> f32 {
    let wrapped = value.rem_euclid(360.0);
    if wrapped > 180.0 {
        wrapped - 360.0
    } else {
        wrapped
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Block {
    pub pos: BlockPos,
    pub id: String,
    pub is_air: bool,
    pub is_solid: bool,
    pub is_liquid: bool,
    pub hardness: f32,
    pub light_level: u8,
}

impl Block {
    pub fn air(pos: BlockPos) -> Self {
        Self {
            pos,
            id: "air".into(),
            is_air: true,
            is_solid: false,
            is_liquid: false,
            hardness: 0.0,
            light_level: 15,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Entity {
    pub id: String,
    pub kind: String,
    pub name: String,
    pub position: Position,
    pub health: f32,
    pub is_hostile: bool,
}
