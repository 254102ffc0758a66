/// Prior box in normalized `[cx, cy, w, h]` form.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prior {
    pub cx: f32,
    pub cy: f32,
    pub w: f32,
    pub h: f32,
}

const STEPS: [u32; 3] = [8, 16, 32];
const MIN_SIZES: [[f32; 2]; 3] = [[16.0, 32.0], [64.0, 128.0], [256.0, 512.0]];
pub const VARIANCE: [f32; 2] = [0.1, 0.2];

/// RetinaFace prior boxes for an input of `width` x `height` pixels.
pub fn generate_priors(width: u32, height: u32) -> Vec<Prior> {
    let (w, h) = (width as f32, height as f32);
    let mut priors = Vec::new();
    for (step, min_sizes) in STEPS.iter().zip(MIN_SIZES.iter()) {
        let rows = height.div_ceil(*step);
        let cols = width.div_ceil(*step);
        let step = *step as f32;
        for i in 0..rows {
            for j in 0..cols {
                for min_size in min_sizes {
                    priors.push(Prior {
                        cx: (j as f32 + 0.5) * step / w,
                        cy: (i as f32 + 0.5) * step / h,
                        w: min_size / w,
                        h: min_size / h,
                    });
                }
            }
        }
    }
    priors
}

/// Decodes a location regression `[dx, dy, dw, dh]` into normalized corners.
pub fn decode_box(prior: &Prior, loc: &[f32]) -> [f32; 4] {
    let cx = prior.cx + loc[0] * VARIANCE[0] * prior.w;
    let cy = prior.cy + loc[1] * VARIANCE[0] * prior.h;
    let w = prior.w * (loc[2] * VARIANCE[1]).exp();
    let h = prior.h * (loc[3] * VARIANCE[1]).exp();
    [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
}

/// Decodes five landmark offsets into normalized points.
pub fn decode_landmarks(prior: &Prior, landm: &[f32]) -> [[f32; 2]; 5] {
    let mut points = [[0.0; 2]; 5];
    for (k, point) in points.iter_mut().enumerate() {
        point[0] = prior.cx + landm[2 * k] * VARIANCE[0] * prior.w;
        point[1] = prior.cy + landm[2 * k + 1] * VARIANCE[0] * prior.h;
    }
    points
}
