use candle_core::{DType, Device, Tensor};
use image::{GrayImage, RgbImage};

/// Convert an RGB image into a `(3, height, width)` `u8` tensor.
pub fn rgb_to_tensor(image: &RgbImage, device: &Device) -> candle_core::Result<Tensor> {
    let (width, height) = image.dimensions();
    Tensor::from_vec(
        image.as_raw().clone(),
        (height as usize, width as usize, 3),
        device,
    )?
    .permute((2, 0, 1))
}

/// Convert a single channel image into a `(1, 1, height, width)` `f32` tensor where pixels at or
/// above half intensity are `1.0` and everything else is `0.0`.
pub fn luma_to_binary_tensor(image: &GrayImage, device: &Device) -> candle_core::Result<Tensor> {
    let (width, height) = image.dimensions();
    let data = image
        .as_raw()
        .iter()
        .map(|&v| if v >= 128 { 1f32 } else { 0f32 })
        .collect::<Vec<_>>();
    Tensor::from_vec(data, (1, 1, height as usize, width as usize), device)
}

/// Convert a `(3, height, width)` `u8` tensor back into an RGB image.
pub fn tensor_to_rgb(tensor: &Tensor) -> anyhow::Result<RgbImage> {
    let tensor = tensor.to_device(&Device::Cpu)?.to_dtype(DType::U8)?;
    let (channel, height, width) = tensor.dims3()?;
    if channel != 3 {
        anyhow::bail!("image tensor must have 3 channels, found {channel}");
    }
    let pixels = tensor.permute((1, 2, 0))?.flatten_all()?.to_vec1::<u8>()?;
    match RgbImage::from_raw(width as u32, height as u32, pixels) {
        Some(image) => Ok(image),
        None => anyhow::bail!("error creating image from tensor {tensor:?}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Luma, Rgb};

    #[test]
    fn rgb_tensor_is_channel_first() {
        let mut image = RgbImage::new(3, 2);
        image.put_pixel(2, 1, Rgb([10, 20, 30]));
        let tensor = rgb_to_tensor(&image, &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[3, 2, 3]);
        let values = tensor.to_vec3::<u8>().unwrap();
        assert_eq!(values[0][1][2], 10);
        assert_eq!(values[1][1][2], 20);
        assert_eq!(values[2][1][2], 30);
    }

    #[test]
    fn rgb_roundtrip_keeps_pixels() {
        let image = RgbImage::from_fn(4, 5, |x, y| Rgb([x as u8, y as u8, (x * y) as u8]));
        let tensor = rgb_to_tensor(&image, &Device::Cpu).unwrap();
        assert_eq!(tensor_to_rgb(&tensor).unwrap(), image);
    }

    #[test]
    fn rejects_non_rgb_tensors() {
        let tensor = Tensor::zeros((1, 4, 4), DType::U8, &Device::Cpu).unwrap();
        assert!(tensor_to_rgb(&tensor).is_err());
    }

    #[test]
    fn luma_is_thresholded() {
        let image = GrayImage::from_fn(2, 1, |x, _| Luma([if x == 0 { 255 } else { 127 }]));
        let tensor = luma_to_binary_tensor(&image, &Device::Cpu).unwrap();
        assert_eq!(tensor.dims(), &[1, 1, 1, 2]);
        let values = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(values, vec![1., 0.]);
    }
}
