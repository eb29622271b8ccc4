/// Local maximum of a sampled series together with its topographic prominence.
#[derive(Debug, Clone, PartialEq)]
pub struct Peak {
    pub index: usize,
    pub value: f64,
    pub prominence: f64,
    pub left_base: usize,
    pub right_base: usize,
}

/// Find local maxima whose prominence is at least `min_prominence`.
///
/// A flat top counts once, at the midpoint (rounded down) of the plateau,
/// and only when both neighbours of the plateau are strictly lower. Samples
/// at either end of the series are never peaks. Input must be free of `NaN`.
pub fn find_peaks(values: &[f64], min_prominence: f64) -> Vec<Peak> {
    local_maxima(values)
        .into_iter()
        .map(|index| measure_prominence(values, index))
        .filter(|peak| peak.prominence >= min_prominence)
        .collect()
}

fn local_maxima(values: &[f64]) -> Vec<usize> {
    let mut maxima = Vec::new();
    if values.len() < 3 {
        return maxima;
    }

    let last = values.len() - 1;
    let mut i = 1;
    while i < last {
        if values[i - 1] < values[i] {
            let mut ahead = i + 1;
            while ahead < last && values[ahead] == values[i] {
                ahead += 1;
            }
            if values[ahead] < values[i] {
                maxima.push((i + ahead - 1) / 2);
            }
            i = ahead;
        } else {
            i += 1;
        }
    }
    maxima
}

fn measure_prominence(values: &[f64], index: usize) -> Peak {
    let height = values[index];

    // Walk outwards until higher ground, tracking the lowest point on each side.
    let mut left_base = index;
    let mut left_min = height;
    for i in (0..=index).rev() {
        if values[i] > height {
            break;
        }
        if values[i] < left_min {
            left_min = values[i];
            left_base = i;
        }
    }

    let mut right_base = index;
    let mut right_min = height;
    for (i, &value) in values.iter().enumerate().skip(index) {
        if value > height {
            break;
        }
        if value < right_min {
            right_min = value;
            right_base = i;
        }
    }

    Peak {
        index,
        value: height,
        prominence: height - left_min.max(right_min),
        left_base,
        right_base,
    }
}
