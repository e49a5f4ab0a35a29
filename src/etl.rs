pub mod describe_changeset;
pub mod parse_osm;

use log::{error, info};

use crate::errors::Result;

pub trait Etl {
    type Input;
    type Output;

    fn etl_name(&self) -> &str;

    fn extract(&mut self) -> Result<Self::Input>;
    fn transform(&mut self, input: Self::Input) -> Result<Self::Output>;

    fn process(&mut self) -> Result<Self::Output> {
        info!(etl_name = self.etl_name(); "Starting ETL process");

        info!(etl_name = self.etl_name(); "Extracting");
        let input = match self.extract() {
            Ok(input) => Ok(input),
            Err(err) => {
                let message = err.to_string();
                error!(etl_name = self.etl_name(), err = message.as_str(); "Extraction failed with error");
                Err(err)
            }
        }?;

        info!(etl_name = self.etl_name(); "Transforming");
        let output = match self.transform(input) {
            Ok(output) => Ok(output),
            Err(err) => {
                let message = err.to_string();
                error!(etl_name = self.etl_name(), err = message.as_str(); "Transformation failed with error");
                Err(err)
            }
        }?;

        info!(etl_name = self.etl_name(); "Process finished");
        Ok(output)
    }
}
