//! Flat Inner-Product 인덱스
//!
//! 모든 벡터를 단위 길이로 정규화해 저장하고, 쿼리와의 내적(= 코사인 유사도)을
//! 전수 비교합니다. 근사 없이 정확한 top-k를 반환합니다.

use thiserror::Error;

/// 인덱스 에러
#[derive(Debug, Error, PartialEq)]
pub enum IndexError {
    #[error("vector dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// 벡터를 단위 길이로 정규화 (영벡터는 그대로 둠)
pub fn normalize_l2(vector: &mut [f32]) {
    let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vector.iter_mut() {
            *x /= norm;
        }
    }
}

/// 두 벡터의 내적
pub fn inner_product(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}

/// 정규화된 벡터의 평면 내적 인덱스
#[derive(Debug, Clone)]
pub struct FlatIpIndex {
    dimension: usize,
    vectors: Vec<Vec<f32>>,
}

impl FlatIpIndex {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            vectors: Vec::new(),
        }
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn len(&self) -> usize {
        self.vectors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vectors.is_empty()
    }

    fn check_dimension(&self, vector: &[f32]) -> Result<(), IndexError> {
        if vector.len() != self.dimension {
            return Err(IndexError::DimensionMismatch {
                expected: self.dimension,
                actual: vector.len(),
            });
        }
        Ok(())
    }

    /// 벡터 추가 (정규화 후 저장). 추가된 위치를 반환합니다.
    pub fn add(&mut self, mut vector: Vec<f32>) -> Result<usize, IndexError> {
        self.check_dimension(&vector)?;
        normalize_l2(&mut vector);
        self.vectors.push(vector);
        Ok(self.vectors.len() - 1)
    }

    /// 상위 k개 검색
    ///
    /// (위치, 내적 점수)를 점수 내림차순으로 반환합니다. 점수가 같으면 먼저 추가된
    /// 벡터가 앞에 옵니다.
    pub fn search(&self, query: &[f32], k: usize) -> Result<Vec<(usize, f32)>, IndexError> {
        self.check_dimension(query)?;

        let mut query = query.to_vec();
        normalize_l2(&mut query);

        let mut scored: Vec<(usize, f32)> = self
            .vectors
            .iter()
            .enumerate()
            .map(|(i, v)| (i, inner_product(&query, v)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
        scored.truncate(k);
        Ok(scored)
    }
}
