// Domain layer - Handles over native resources and media conversion

pub mod convert;
pub mod params;
pub mod thumbnail;

pub use convert::{ConversionStats, ConvertRequest, MediaConverter, RateControl};
pub use params::{CodecParameters, ParametersSummary};
pub use thumbnail::{Thumbnail, ThumbnailExtractor};
