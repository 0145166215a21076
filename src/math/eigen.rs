use nalgebra as na;

/// Null vector of a (near-)singular 3x3 matrix.
///
/// For a rank-2 matrix any cross product of two independent rows spans the null space. The
/// product with the largest norm is the best conditioned one.
pub fn null_vector(matrix: &na::Matrix3<f64>) -> Option<na::Vector3<f64>> {
    let row0 = matrix.row(0).transpose();
    let row1 = matrix.row(1).transpose();
    let row2 = matrix.row(2).transpose();

    let best = [row0.cross(&row1), row0.cross(&row2), row1.cross(&row2)]
        .into_iter()
        .max_by(|a, b| a.norm_squared().total_cmp(&b.norm_squared()))?;

    let norm = best.norm();
    if !norm.is_finite() || norm < 1e-150 {
        return None;
    }
    Some(best / norm)
}

/// Real eigenvalues of a general 3x3 matrix, computed from its real Schur form.
///
/// Complex conjugate pairs are dropped.
pub fn real_eigenvalues(matrix: &na::Matrix3<f64>) -> Vec<f64> {
    let scale = matrix.amax().max(f64::MIN_POSITIVE);
    matrix
        .complex_eigenvalues()
        .iter()
        .filter(|ev| ev.im.abs() <= 1e-9 * scale)
        .map(|ev| ev.re)
        .collect()
}

/// Eigendecomposition of a symmetric 3x3 matrix with eigenvalues sorted in descending order.
///
/// Column `i` of the returned matrix is the eigenvector of the `i`-th eigenvalue.
pub fn sorted_symmetric_eigen(matrix: &na::Matrix3<f64>) -> (na::Vector3<f64>, na::Matrix3<f64>) {
    let eigen = na::SymmetricEigen::new(*matrix);

    let mut order = [0usize, 1, 2];
    order.sort_by(|&i, &j| eigen.eigenvalues[j].total_cmp(&eigen.eigenvalues[i]));

    let values = na::Vector3::from_fn(|i, _| eigen.eigenvalues[order[i]]);
    let vectors = na::Matrix3::from_columns(&order.map(|i| eigen.eigenvectors.column(i).into_owned()));

    (values, vectors)
}
