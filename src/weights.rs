use crate::layers::LinearT;
use crate::math::Matrix;
use crate::models::{Decoder, Encoder, Vae};
use serde::{Deserialize, Serialize};
use std::{fs, io};

/// Serialized VAE checkpoint: every weight matrix in parameter order.
#[derive(Serialize, Deserialize)]
pub struct VaeJson {
    pub encoder: Vec<Vec<Vec<f32>>>,
    pub decoder: Vec<Vec<Vec<f32>>>,
}

/// Convert a [`Matrix`] into a 2-D `Vec` for serialisation.
pub fn matrix_to_vec2(m: &Matrix) -> Vec<Vec<f32>> {
    (0..m.rows)
        .map(|r| (0..m.cols).map(|c| m.get(r, c)).collect())
        .collect()
}

/// Convert a 2-D `Vec` into a [`Matrix`].
pub fn vec2_to_matrix(rows: &[Vec<f32>]) -> Matrix {
    if rows.is_empty() || rows[0].is_empty() {
        return Matrix::zeros(0, 0);
    }
    let r = rows.len();
    let c = rows[0].len();
    let mut mat = Matrix::zeros(r, c);
    for (i, row) in rows.iter().enumerate() {
        for (j, &val) in row.iter().enumerate() {
            mat.set(i, j, val);
        }
    }
    mat
}

fn dump_params(params: Vec<&mut LinearT>) -> Vec<Vec<Vec<f32>>> {
    params.iter().map(|p| matrix_to_vec2(&p.w)).collect()
}

fn restore_params(params: Vec<&mut LinearT>, saved: &[Vec<Vec<f32>>]) -> io::Result<()> {
    if params.len() != saved.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!(
                "checkpoint has {} parameter matrices, model expects {}",
                saved.len(),
                params.len()
            ),
        ));
    }
    for (p, rows) in params.into_iter().zip(saved.iter()) {
        let mat = vec2_to_matrix(rows);
        if mat.rows != p.w.rows || mat.cols != p.w.cols {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!(
                    "checkpoint matrix is {}x{}, model expects {}x{}",
                    mat.rows, mat.cols, p.w.rows, p.w.cols
                ),
            ));
        }
        p.w = mat;
    }
    Ok(())
}

/// Save every VAE weight matrix to `path` as JSON, creating parent
/// directories as needed.
pub fn save_vae<E, D>(path: &str, vae: &mut Vae<E, D>) -> io::Result<()>
where
    E: Encoder,
    D: Decoder<Input = E::Input>,
{
    let json = VaeJson {
        encoder: dump_params(vae.encoder_parameters()),
        decoder: dump_params(vae.decoder_parameters()),
    };
    let txt = serde_json::to_string(&json).map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
    if let Some(parent) = std::path::Path::new(path).parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, txt)
}

/// Load a checkpoint saved with [`save_vae`] into an existing model.
/// Shapes are checked matrix by matrix.
pub fn load_vae<E, D>(path: &str, vae: &mut Vae<E, D>) -> io::Result<()>
where
    E: Encoder,
    D: Decoder<Input = E::Input>,
{
    let txt = fs::read_to_string(path)?;
    let json: VaeJson =
        serde_json::from_str(&txt).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    restore_params(vae.encoder_parameters(), &json.encoder)?;
    restore_params(vae.decoder_parameters(), &json.decoder)
}
