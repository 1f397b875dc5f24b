use image::{GrayImage, Luma};
use imageproc::contrast::{threshold, ThresholdType};
use imageproc::region_labelling::{connected_components, Connectivity};
use std::collections::HashMap;

use crate::models::Component;

/// Label the 8-connected foreground regions of an image.
///
/// Every non-zero pixel is foreground, whatever its intensity. Components are
/// returned in the raster order of their first pixel, so the order does not
/// depend on how labels are numbered.
pub fn find_components(img: &GrayImage) -> (Vec<Component>, image::ImageBuffer<Luma<u32>, Vec<u32>>) {
    let binary = threshold(img, 0, ThresholdType::Binary);
    let labeled = connected_components(&binary, Connectivity::Eight, Luma([0u8]));

    let mut index_of: HashMap<u32, usize> = HashMap::new();
    let mut components: Vec<Component> = Vec::new();

    for (x, y, label) in labeled.enumerate_pixels() {
        let label = label[0];
        if label == 0 {
            continue; // Skip background
        }

        match index_of.get(&label) {
            Some(&idx) => {
                let c = &mut components[idx];
                c.min_x = c.min_x.min(x);
                c.min_y = c.min_y.min(y);
                c.max_x = c.max_x.max(x);
                c.max_y = c.max_y.max(y);
                c.pixel_count += 1;
            }
            None => {
                index_of.insert(label, components.len());
                components.push(Component {
                    label,
                    min_x: x,
                    min_y: y,
                    max_x: x,
                    max_y: y,
                    pixel_count: 1,
                });
            }
        }
    }

    (components, labeled)
}

/// Pick the component with the most pixels; ties go to the earliest one
pub fn largest(components: &[Component]) -> Option<&Component> {
    components.iter().fold(None, |best: Option<&Component>, c| match best {
        Some(b) if b.pixel_count >= c.pixel_count => Some(b),
        _ => Some(c),
    })
}

/// Result of isolating the dominant component
#[derive(Debug, Clone)]
pub struct IsolatedComponent {
    /// Same size as the input: 255 on the kept component, 0 elsewhere
    pub mask: GrayImage,
    pub component: Component,
    pub total_components: usize,
}

/// Keep only the largest 8-connected component; non-zero pixels count as foreground
pub fn isolate_largest(img: &GrayImage) -> Option<IsolatedComponent> {
    let (components, labeled) = find_components(img);
    let component = largest(&components)?.clone();

    let mut mask = GrayImage::new(img.width(), img.height());
    for (x, y, label) in labeled.enumerate_pixels() {
        if label[0] == component.label {
            mask.put_pixel(x, y, Luma([255]));
        }
    }

    Some(IsolatedComponent {
        mask,
        component,
        total_components: components.len(),
    })
}
