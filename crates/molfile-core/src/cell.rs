use crate::error::{MolError, MolResult};
use crate::types::{Matrix3D, Vector3D};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CellShape {
    Infinite,
    Orthorhombic,
    Triclinic,
}

/// Periodic cell geometry, stored as a row-major matrix of cell vectors.
///
/// The `a` vector lies along x and the `b` vector in the xy plane, so the
/// matrix is lower triangular for cells built from lengths and angles.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitCell {
    matrix: Matrix3D,
    shape: CellShape,
}

impl Default for UnitCell {
    fn default() -> Self {
        Self::infinite()
    }
}

impl UnitCell {
    pub fn infinite() -> Self {
        Self {
            matrix: [[0.0; 3]; 3],
            shape: CellShape::Infinite,
        }
    }

    pub fn orthorhombic(a: f64, b: f64, c: f64) -> MolResult<Self> {
        check_lengths(a, b, c)?;
        Ok(Self {
            matrix: [[a, 0.0, 0.0], [0.0, b, 0.0], [0.0, 0.0, c]],
            shape: CellShape::Orthorhombic,
        })
    }

    pub fn triclinic(a: f64, b: f64, c: f64, alpha: f64, beta: f64, gamma: f64) -> MolResult<Self> {
        check_lengths(a, b, c)?;
        check_angles(alpha, beta, gamma)?;
        if alpha == 90.0 && beta == 90.0 && gamma == 90.0 {
            return Self::orthorhombic(a, b, c);
        }

        let cos_alpha = alpha.to_radians().cos();
        let cos_beta = beta.to_radians().cos();
        let (sin_gamma, cos_gamma) = gamma.to_radians().sin_cos();

        let bx = b * cos_gamma;
        let by = b * sin_gamma;
        let cx = c * cos_beta;
        let cy = c * (cos_alpha - cos_beta * cos_gamma) / sin_gamma;
        let cz_squared = c * c - cx * cx - cy * cy;
        if cz_squared <= 0.0 {
            return Err(MolError::Invalid(format!(
                "invalid unit cell: angles {alpha}/{beta}/{gamma} give a non-positive volume"
            )));
        }

        Ok(Self {
            matrix: [
                [a, 0.0, 0.0],
                [bx, by, 0.0],
                [cx, cy, cz_squared.sqrt()],
            ],
            shape: CellShape::Triclinic,
        })
    }

    pub fn from_matrix(matrix: Matrix3D) -> MolResult<Self> {
        if matrix.iter().flatten().all(|&x| x == 0.0) {
            return Ok(Self::infinite());
        }
        let orthorhombic = matrix[0][1] == 0.0
            && matrix[0][2] == 0.0
            && matrix[1][0] == 0.0
            && matrix[1][2] == 0.0
            && matrix[2][0] == 0.0
            && matrix[2][1] == 0.0;
        let cell = Self {
            matrix,
            shape: if orthorhombic {
                CellShape::Orthorhombic
            } else {
                CellShape::Triclinic
            },
        };
        if cell.volume() <= 0.0 {
            return Err(MolError::Invalid(
                "invalid unit cell: matrix has non-positive volume".into(),
            ));
        }
        Ok(cell)
    }

    pub fn shape(&self) -> CellShape {
        self.shape
    }

    pub fn matrix(&self) -> Matrix3D {
        self.matrix
    }

    pub fn is_infinite(&self) -> bool {
        self.shape == CellShape::Infinite
    }

    fn vector(&self, i: usize) -> Vector3D {
        Vector3D::from_array(self.matrix[i])
    }

    pub fn a(&self) -> f64 {
        self.vector(0).norm()
    }

    pub fn b(&self) -> f64 {
        self.vector(1).norm()
    }

    pub fn c(&self) -> f64 {
        self.vector(2).norm()
    }

    /// Angle between the `b` and `c` vectors, in degrees (90 when infinite).
    pub fn alpha(&self) -> f64 {
        angle_between(self.vector(1), self.vector(2))
    }

    /// Angle between the `a` and `c` vectors, in degrees (90 when infinite).
    pub fn beta(&self) -> f64 {
        angle_between(self.vector(0), self.vector(2))
    }

    /// Angle between the `a` and `b` vectors, in degrees (90 when infinite).
    pub fn gamma(&self) -> f64 {
        angle_between(self.vector(0), self.vector(1))
    }

    pub fn volume(&self) -> f64 {
        determinant(&self.matrix).abs()
    }

    /// Wrap a displacement vector into the cell, minimum-image style.
    pub fn wrap(&self, vector: Vector3D) -> Vector3D {
        match self.shape {
            CellShape::Infinite => vector,
            CellShape::Orthorhombic => {
                let a = self.matrix[0][0];
                let b = self.matrix[1][1];
                let c = self.matrix[2][2];
                Vector3D::new(
                    vector.x - (vector.x / a).round() * a,
                    vector.y - (vector.y / b).round() * b,
                    vector.z - (vector.z / c).round() * c,
                )
            }
            CellShape::Triclinic => {
                let inverse = invert(&self.matrix);
                let fractional = multiply(&inverse, vector);
                let wrapped = Vector3D::new(
                    fractional.x - fractional.x.round(),
                    fractional.y - fractional.y.round(),
                    fractional.z - fractional.z.round(),
                );
                multiply(&self.matrix, wrapped)
            }
        }
    }
}

fn check_lengths(a: f64, b: f64, c: f64) -> MolResult<()> {
    if a <= 0.0 || b <= 0.0 || c <= 0.0 {
        return Err(MolError::Invalid(format!(
            "invalid unit cell: lengths must be positive, got {a}/{b}/{c}"
        )));
    }
    Ok(())
}

fn check_angles(alpha: f64, beta: f64, gamma: f64) -> MolResult<()> {
    for angle in [alpha, beta, gamma] {
        if angle <= 0.0 || angle >= 180.0 {
            return Err(MolError::Invalid(format!(
                "invalid unit cell: angle {angle} is outside (0, 180)"
            )));
        }
    }
    Ok(())
}

fn angle_between(u: Vector3D, v: Vector3D) -> f64 {
    let norms = u.norm() * v.norm();
    if norms == 0.0 {
        return 90.0;
    }
    (u.dot(v) / norms).clamp(-1.0, 1.0).acos().to_degrees()
}

fn determinant(m: &Matrix3D) -> f64 {
    m[0][0] * (m[1][1] * m[2][2] - m[1][2] * m[2][1])
        - m[0][1] * (m[1][0] * m[2][2] - m[1][2] * m[2][0])
        + m[0][2] * (m[1][0] * m[2][1] - m[1][1] * m[2][0])
}

fn invert(m: &Matrix3D) -> Matrix3D {
    let det = determinant(m);
    [
        [
            (m[1][1] * m[2][2] - m[1][2] * m[2][1]) / det,
            (m[0][2] * m[2][1] - m[0][1] * m[2][2]) / det,
            (m[0][1] * m[1][2] - m[0][2] * m[1][1]) / det,
        ],
        [
            (m[1][2] * m[2][0] - m[1][0] * m[2][2]) / det,
            (m[0][0] * m[2][2] - m[0][2] * m[2][0]) / det,
            (m[0][2] * m[1][0] - m[0][0] * m[1][2]) / det,
        ],
        [
            (m[1][0] * m[2][1] - m[1][1] * m[2][0]) / det,
            (m[0][1] * m[2][0] - m[0][0] * m[2][1]) / det,
            (m[0][0] * m[1][1] - m[0][1] * m[1][0]) / det,
        ],
    ]
}

/// Row-vector times matrix: fractional <-> cartesian conversions.
fn multiply(m: &Matrix3D, v: Vector3D) -> Vector3D {
    Vector3D::new(
        v.x * m[0][0] + v.y * m[1][0] + v.z * m[2][0],
        v.x * m[0][1] + v.y * m[1][1] + v.z * m[2][1],
        v.x * m[0][2] + v.y * m[1][2] + v.z * m[2][2],
    )
}
