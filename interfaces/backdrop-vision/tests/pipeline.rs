use backdrop_vision::*;
use image::{Rgb, RgbImage};
use pretty_assertions::assert_eq;
use rand::Rng;

const CAR_PROMPT: &str = "a car driving on Mars. Studio lights, 1970s";
const CAR_NEGATIVE_PROMPT: &str = "artifacts, low quality, distortion";

// The car occupies this rectangle of the synthetic photo
const CAR: (u32, u32, u32, u32) = (100, 140, 360, 300);

fn in_car(x: u32, y: u32) -> bool {
    let (x1, y1, x2, y2) = CAR;
    (x1..x2).contains(&x) && (y1..y2).contains(&y)
}

fn car_photo() -> RgbImage {
    RgbImage::from_fn(512, 512, |x, y| {
        if in_car(x, y) {
            Rgb([180, 20, 30])
        } else {
            Rgb([90, 140, 220])
        }
    })
}

fn car_points() -> ForegroundPoints {
    ForegroundPoints::new([Point::new(150, 170), Point::new(300, 250)]).unwrap()
}

/// Proposes the car, the car with some road, and the whole frame, like SAM's three outputs.
struct CarSegmenter;

impl Segmenter for CarSegmenter {
    fn segment(
        &self,
        request: SegmentationRequest<'_>,
    ) -> Result<SegmentationResponse, CapabilityError> {
        let (width, height) = request.image.dimensions();
        let hits = request
            .points
            .iter()
            .all(|point| request.image.get_pixel(point.x, point.y) == &Rgb([180, 20, 30]));
        let car = SelectionMask::from_fn(width, height, in_car);
        let with_road = SelectionMask::from_fn(width, height, |x, y| in_car(x, y) || y > 300);
        let everything = SelectionMask::from_fn(width, height, |_, _| true);
        Ok(SegmentationResponse {
            candidates: vec![
                MaskCandidate {
                    mask: with_road,
                    iou_score: 0.71,
                },
                MaskCandidate {
                    mask: car,
                    iou_score: if hits { 0.97 } else { 0.1 },
                },
                MaskCandidate {
                    mask: everything,
                    iou_score: 0.42,
                },
            ],
            original_size: (width, height),
            reshaped_input_size: (1024, 1024),
        })
    }
}

struct EmptySegmenter;

impl Segmenter for EmptySegmenter {
    fn segment(
        &self,
        request: SegmentationRequest<'_>,
    ) -> Result<SegmentationResponse, CapabilityError> {
        Ok(SegmentationResponse {
            candidates: Vec::new(),
            original_size: request.image.dimensions(),
            reshaped_input_size: (1024, 1024),
        })
    }
}

/// Paints seeded noise under the mask and leaves everything else alone.
struct NoiseInpainter;

impl Inpainter for NoiseInpainter {
    fn inpaint(&self, request: InpaintRequest<'_>) -> Result<RgbImage, CapabilityError> {
        if request.prompt.is_empty() {
            return Err("an empty prompt cannot be generated".into());
        }
        let mut rng = request.generator.rng();
        let mut image = request.image.clone();
        for (pixel, mask) in image.pixels_mut().zip(request.mask.pixels()) {
            if mask.0[0] == 255 {
                *pixel = Rgb(rng.gen());
            }
        }
        Ok(image)
    }
}

fn app() -> BackdropApp<CarSegmenter, NoiseInpainter> {
    BackdropApp::new(CarSegmenter, NoiseInpainter)
}

fn swap(seed: u64) -> SwapResponse {
    app()
        .handle(SwapRequest {
            image: car_photo(),
            points: car_points(),
            prompt: PromptBundle::new(CAR_PROMPT)
                .with_negative_prompt(CAR_NEGATIVE_PROMPT)
                .with_seed(seed)
                .with_guidance_scale(7.0),
        })
        .unwrap()
}

#[test]
fn mask_matches_the_image_size() {
    let response = app()
        .handle(MaskRequest {
            image: car_photo(),
            points: car_points(),
        })
        .unwrap();
    assert_eq!(response.mask.dimensions(), (512, 512));
    assert_eq!(response.overlay.dimensions(), (512, 512));
}

#[test]
fn mask_is_the_complement_of_the_best_candidate() {
    let image = car_photo();
    let points = car_points();
    let best = CarSegmenter
        .segment(SegmentationRequest {
            image: &image,
            points: &points,
        })
        .unwrap()
        .candidates
        .into_iter()
        .max_by(|a, b| a.iou_score.total_cmp(&b.iou_score))
        .unwrap();

    let mask = MaskAdapter::new(&CarSegmenter).mask(&image, &points).unwrap();
    let expected: Vec<bool> = best.mask.as_slice().iter().map(|selected| !selected).collect();
    assert_eq!(mask.to_bools(), expected);
}

#[test]
fn car_footprint_is_kept_and_surroundings_are_filled() {
    let mask = app()
        .handle(MaskRequest {
            image: car_photo(),
            points: car_points(),
        })
        .unwrap()
        .mask;
    assert_eq!(mask.region(200, 200), Some(Region::Subject));
    assert_eq!(mask.region(10, 10), Some(Region::Fill));
    assert_eq!(mask.region(450, 480), Some(Region::Fill));
    assert_eq!(
        mask.subject_bbox(),
        Some(BoundingBox {
            x1: 100,
            y1: 140,
            x2: 360,
            y2: 300
        })
    );
}

#[test]
fn same_seed_gives_the_same_image() {
    assert_eq!(swap(74294536).result, swap(74294536).result);
}

#[test]
fn different_seeds_change_the_background() {
    assert_ne!(swap(74294536).result, swap(1).result);
}

#[test]
fn result_keeps_the_subject_and_the_size() {
    let original = car_photo();
    let response = swap(DEFAULT_SEED);
    assert_eq!(response.result.dimensions(), original.dimensions());
    for (x, y, pixel) in response.result.enumerate_pixels() {
        if response.mask.region(x, y) == Some(Region::Subject) {
            assert_eq!(pixel, original.get_pixel(x, y));
        }
    }
}

#[test]
fn empty_candidate_set_is_fatal() {
    let app = BackdropApp::new(EmptySegmenter, NoiseInpainter);
    let err = app
        .handle(SwapRequest {
            image: car_photo(),
            points: car_points(),
            prompt: PromptBundle::new(CAR_PROMPT),
        })
        .unwrap_err();
    assert!(matches!(err, Error::NoMaskCandidates));
}

#[test]
fn capability_failures_propagate() {
    let mask = Mask::from_fn(512, 512, |x, y| {
        if in_car(x, y) {
            Region::Subject
        } else {
            Region::Fill
        }
    });
    let err = app()
        .handle(FillRequest {
            image: car_photo(),
            mask,
            prompt: PromptBundle::new(""),
        })
        .unwrap_err();
    assert!(matches!(err, Error::Inpainting(_)));
    assert!(err.to_string().contains("empty prompt"));
}

#[test]
fn preview_grid_lines_up_input_mask_and_result() {
    let response = swap(DEFAULT_SEED);
    let grid = make_image_grid(
        &[
            image::DynamicImage::ImageRgb8(car_photo()),
            image::DynamicImage::ImageRgba8(response.overlay),
            image::DynamicImage::ImageRgb8(response.result),
        ],
        1,
        3,
    )
    .unwrap();
    assert_eq!(grid.dimensions(), (1536, 512));
}
