use super::{Xml, end, start, text, version};
use crate::error::Result;
use repodata_rpm::{FileKind, PackageRecord};

pub(super) fn write_package(xml: &mut Xml, record: &PackageRecord) -> Result<()> {
    start(xml, "package", &[("pkgid", record.pkgid()), ("name", &record.name), ("arch", &record.arch)])?;
    version(xml, &record.evr)?;
    for file in record.files() {
        match file.kind {
            FileKind::File => text(xml, "file", &[], &file.path)?,
            FileKind::Dir => text(xml, "file", &[("type", "dir")], &file.path)?,
            FileKind::Ghost => text(xml, "file", &[("type", "ghost")], &file.path)?,
        }
    }
    end(xml, "package")
}
