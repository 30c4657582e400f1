pub const SUCCESS: i32 = 0;
/// Invalid flags, environment values or unavailable output format
pub const CONFIG_ERROR: i32 = 2;
/// Socket, replay file or output directory could not be opened
pub const IO_ERROR: i32 = 3;
/// A digitizer worker failed while writing
pub const RUNTIME_ERROR: i32 = 4;
