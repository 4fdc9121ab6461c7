//! Use case implementations.

mod feed_images_use_case;

pub use feed_images_use_case::FeedImagesUseCase;
