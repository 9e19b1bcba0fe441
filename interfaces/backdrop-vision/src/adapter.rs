use image::{imageops::FilterType, RgbImage};

use crate::{
    Error, ForegroundPoints, Generator, InpaintRequest, Inpainter, Mask, MaskCandidate,
    PromptBundle, Region, SegmentationRequest, Segmenter,
};

/// Turns clicked points into a [`Mask`] with a [`Segmenter`].
pub struct MaskAdapter<'a, S: ?Sized> {
    segmenter: &'a S,
}

impl<'a, S: Segmenter + ?Sized> MaskAdapter<'a, S> {
    /// Create a new adapter around a segmentation model
    pub fn new(segmenter: &'a S) -> Self {
        Self { segmenter }
    }

    /// Segment the subject under `points` and return the mask of everything else.
    ///
    /// The candidate with the highest IoU score is used. Its polarity is inverted so that the
    /// subject is [`Region::Subject`](crate::Region::Subject) and the rest is
    /// [`Region::Fill`](crate::Region::Fill).
    pub fn mask(&self, image: &RgbImage, points: &ForegroundPoints) -> Result<Mask, Error> {
        let (width, height) = image.dimensions();
        for point in points.out_of_bounds(width, height) {
            tracing::warn!("point {point} is outside of the {width}x{height} image");
        }

        let response = self
            .segmenter
            .segment(SegmentationRequest { image, points })
            .map_err(Error::Segmentation)?;
        tracing::debug!(
            "segmentation returned {} candidates (original {:?}, reshaped {:?})",
            response.candidates.len(),
            response.original_size,
            response.reshaped_input_size
        );

        let best = select_best_candidate(response.candidates).ok_or(Error::NoMaskCandidates)?;
        tracing::debug!("selected mask candidate with iou {}", best.iou_score);

        let found = best.mask.dimensions();
        if found != (width, height) {
            return Err(Error::DimensionMismatch {
                what: "segmentation mask",
                expected: (width, height),
                found,
            });
        }

        Ok(Mask::from_selection(&best.mask))
    }
}

/// Pick the candidate with the highest IoU score. On ties the earliest candidate is kept.
pub fn select_best_candidate(
    candidates: impl IntoIterator<Item = MaskCandidate>,
) -> Option<MaskCandidate> {
    candidates.into_iter().fold(None, |best, candidate| match best {
        Some(best) if candidate.iou_score <= best.iou_score || candidate.iou_score.is_nan() => {
            Some(best)
        }
        _ => Some(candidate),
    })
}

/// Regenerates the [`Region::Fill`](crate::Region::Fill) part of an image with an [`Inpainter`].
pub struct InpaintAdapter<'a, I: ?Sized> {
    inpainter: &'a I,
}

impl<'a, I: Inpainter + ?Sized> InpaintAdapter<'a, I> {
    /// Create a new adapter around an inpainting model
    pub fn new(inpainter: &'a I) -> Self {
        Self { inpainter }
    }

    /// Replace the fill region of `image` with content generated from `prompt`.
    ///
    /// The result always has the same size as `image`.
    pub fn inpaint(
        &self,
        image: &RgbImage,
        mask: &Mask,
        prompt: &PromptBundle,
    ) -> Result<RgbImage, Error> {
        let expected = image.dimensions();
        let found = mask.dimensions();
        if found != expected {
            return Err(Error::DimensionMismatch {
                what: "mask",
                expected,
                found,
            });
        }

        let mask_image = mask.to_luma();
        let generator = Generator::manual_seed(prompt.seed());
        tracing::debug!(
            "inpainting {} of {} pixels with seed {} and guidance scale {}",
            mask.fill_count(),
            mask.regions().len(),
            generator.seed(),
            prompt.guidance_scale()
        );

        let result = self
            .inpainter
            .inpaint(InpaintRequest {
                image,
                mask: &mask_image,
                prompt: prompt.prompt(),
                negative_prompt: prompt.negative_prompt(),
                generator,
                guidance_scale: prompt.guidance_scale(),
            })
            .map_err(Error::Inpainting)?;

        if result.dimensions() == expected {
            return Ok(result);
        }
        tracing::debug!(
            "resizing inpainted image from {:?} to {:?}",
            result.dimensions(),
            expected
        );
        let mut resized =
            image::imageops::resize(&result, expected.0, expected.1, FilterType::CatmullRom);
        // Resampling bleeds across the mask edge, the subject is restored from the input
        for (x, y, pixel) in resized.enumerate_pixels_mut() {
            if mask.region(x, y) == Some(Region::Subject) {
                *pixel = *image.get_pixel(x, y);
            }
        }
        Ok(resized)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CapabilityError, Point, SegmentationResponse, SelectionMask};
    use image::Rgb;
    use std::cell::RefCell;

    fn candidate(score: f32, selected: bool) -> MaskCandidate {
        MaskCandidate {
            mask: SelectionMask::from_fn(4, 4, |_, _| selected),
            iou_score: score,
        }
    }

    struct FixedSegmenter(Vec<MaskCandidate>);

    impl Segmenter for FixedSegmenter {
        fn segment(
            &self,
            request: SegmentationRequest<'_>,
        ) -> Result<SegmentationResponse, CapabilityError> {
            Ok(SegmentationResponse {
                candidates: self.0.clone(),
                original_size: request.image.dimensions(),
                reshaped_input_size: (1024, 1024),
            })
        }
    }

    fn points() -> ForegroundPoints {
        ForegroundPoints::new([Point::new(1, 1)]).unwrap()
    }

    #[test]
    fn highest_score_wins() {
        let best = select_best_candidate(vec![
            candidate(0.2, false),
            candidate(0.9, true),
            candidate(0.5, false),
        ])
        .unwrap();
        assert_eq!(best.iou_score, 0.9);
    }

    #[test]
    fn ties_keep_the_first_candidate() {
        let best = select_best_candidate(vec![candidate(0.7, true), candidate(0.7, false)]).unwrap();
        assert!(best.mask.get(0, 0));
    }

    #[test]
    fn nan_scores_never_win() {
        let best = select_best_candidate(vec![candidate(0.1, true), candidate(f32::NAN, false)])
            .unwrap();
        assert_eq!(best.iou_score, 0.1);
    }

    #[test]
    fn no_candidates_is_an_error() {
        let image = RgbImage::new(4, 4);
        let segmenter = FixedSegmenter(Vec::new());
        let err = MaskAdapter::new(&segmenter)
            .mask(&image, &points())
            .unwrap_err();
        assert!(matches!(err, Error::NoMaskCandidates));
    }

    #[test]
    fn selected_pixels_become_the_subject() {
        let image = RgbImage::new(4, 4);
        let segmenter = FixedSegmenter(vec![candidate(0.3, false), candidate(0.8, true)]);
        let mask = MaskAdapter::new(&segmenter).mask(&image, &points()).unwrap();
        assert!(mask.regions().iter().all(|r| *r == Region::Subject));
    }

    #[test]
    fn mismatched_candidate_is_rejected() {
        let image = RgbImage::new(8, 8);
        let segmenter = FixedSegmenter(vec![candidate(0.3, true)]);
        let err = MaskAdapter::new(&segmenter)
            .mask(&image, &points())
            .unwrap_err();
        assert!(matches!(
            err,
            Error::DimensionMismatch {
                expected: (8, 8),
                found: (4, 4),
                ..
            }
        ));
    }

    #[derive(Default)]
    struct RecordingInpainter {
        seen: RefCell<Vec<(u64, f64, Option<String>, usize)>>,
        output_size: Option<(u32, u32)>,
    }

    impl Inpainter for RecordingInpainter {
        fn inpaint(&self, request: InpaintRequest<'_>) -> Result<RgbImage, CapabilityError> {
            let white = request.mask.pixels().filter(|p| p.0[0] == 255).count();
            self.seen.borrow_mut().push((
                request.generator.seed(),
                request.guidance_scale,
                request.negative_prompt.map(str::to_string),
                white,
            ));
            let (w, h) = self.output_size.unwrap_or(request.image.dimensions());
            Ok(RgbImage::from_pixel(w, h, Rgb([1, 2, 3])))
        }
    }

    #[test]
    fn forwards_the_prompt_bundle() {
        let image = RgbImage::new(4, 4);
        let mask = Mask::from_fn(4, 4, |x, _| if x < 1 { Region::Subject } else { Region::Fill });
        let inpainter = RecordingInpainter::default();
        let prompt = PromptBundle::new("mars")
            .with_negative_prompt("blur")
            .with_seed(42)
            .with_guidance_scale(3.5);
        InpaintAdapter::new(&inpainter)
            .inpaint(&image, &mask, &prompt)
            .unwrap();
        assert_eq!(
            inpainter.seen.borrow().as_slice(),
            &[(42, 3.5, Some("blur".to_string()), 12)]
        );
    }

    #[test]
    fn mask_must_match_the_image() {
        let image = RgbImage::new(4, 4);
        let mask = Mask::from_fn(2, 2, |_, _| Region::Fill);
        let err = InpaintAdapter::new(&RecordingInpainter::default())
            .inpaint(&image, &mask, &PromptBundle::new("mars"))
            .unwrap_err();
        assert!(matches!(err, Error::DimensionMismatch { what: "mask", .. }));
    }

    #[test]
    fn results_are_resized_to_the_input() {
        let image = RgbImage::new(4, 4);
        let mask = Mask::from_fn(4, 4, |_, _| Region::Fill);
        let inpainter = RecordingInpainter {
            output_size: Some((8, 8)),
            ..Default::default()
        };
        let result = InpaintAdapter::new(&inpainter)
            .inpaint(&image, &mask, &PromptBundle::new("mars"))
            .unwrap();
        assert_eq!(result.dimensions(), (4, 4));
    }

    /// Returns an upscaled copy of the input with the fill region painted over.
    struct UpscalingInpainter;

    impl Inpainter for UpscalingInpainter {
        fn inpaint(&self, request: InpaintRequest<'_>) -> Result<RgbImage, CapabilityError> {
            let (w, h) = request.image.dimensions();
            Ok(RgbImage::from_fn(w * 2, h * 2, |x, y| {
                if request.mask.get_pixel(x / 2, y / 2).0[0] == 255 {
                    Rgb([0, 255, 0])
                } else {
                    *request.image.get_pixel(x / 2, y / 2)
                }
            }))
        }
    }

    #[test]
    fn resizing_keeps_subject_pixels_exact() {
        let image = RgbImage::from_fn(16, 16, |x, y| Rgb([(x * 16) as u8, (y * 16) as u8, 200]));
        let mask = Mask::from_fn(16, 16, |x, _| {
            if x < 8 {
                Region::Subject
            } else {
                Region::Fill
            }
        });
        let result = InpaintAdapter::new(&UpscalingInpainter)
            .inpaint(&image, &mask, &PromptBundle::new("mars"))
            .unwrap();
        let changed = result
            .enumerate_pixels()
            .filter(|(x, y, pixel)| {
                mask.region(*x, *y) == Some(Region::Subject) && *pixel != image.get_pixel(*x, *y)
            })
            .count();
        assert_eq!(changed, 0);
        assert!(result.get_pixel(15, 15).0[1] > 200);
    }
}
