//! Classification data for the generic humanoid rig.
//!
//! One entry per joint family. Keys ending in `_` are sided families; the
//! actual joints append `L` or `R`. Codes are seven characters, one per DOF
//! in the order offset x/y/z, rotation, scale x/y/z:
//!
//!     x  locked         c  constrained    s  shape
//!     S  internal shape f  pose (FK)      i  noise
//!     u  unknown        ?  unknown
//!
//! Single-character codes are shorthands: `f` is `xxxfxxx`, `c` is
//! `xxxcxxx` and `?` is `???????`.

pub static FAMILIES: &[(&str, &str)] = &[
    // Root and pelvis
    ("cf_N_height", "fffxscc"),
    ("cf_J_Kosi01_s", "xxxxsxs"),
    ("cf_J_Kosi02_s", "xxxxsxs"),
    ("cf_J_Kokan", "xxsssss"),
    ("cf_J_SiriDam_", "c"),
    ("cf_J_Siri_s_", "sssssss"),
    ("cf_J_Siriopen_s_", "?"),
    ("cf_J_Ana", "sssssss"),

    // Legs
    ("cf_J_LegUpDam_s_", "xixxsxs"),
    ("cf_J_LegUp00_", "sssfscc"),
    ("cf_J_LegUp01_", "xxxSxxx"),
    ("cf_J_LegUp01_s_", "SxSSsxs"),
    ("cf_J_LegUp02_", "xxxcxxx"),
    ("cf_J_LegUp02_s_", "xxxisxs"),
    ("cf_J_LegUp03_s_", "xxxxsxs"),
    ("cf_J_LegKnee_low_s_", "xxScsss"),
    ("cf_J_LegKnee_back_s_", "xxSxsss"),
    ("cf_J_LegLow01_s_", "ixuisxs"),
    ("cf_J_LegLow02_s_", "xxxxsxs"),
    ("cf_J_LegLow03_s_", "SxSSsxs"),
    ("cf_J_Foot01_", "xxxfsss"),
    ("cf_J_Foot02_", "xssfsss"),
    ("cf_J_Toes01_", "xcsfsss"),
    ("cf_J_Toes_Hallux1_", "sssfsss"),
    ("cf_J_Toes_Long1_", "sssfsss"),
    ("cf_J_Toes_Middle1_", "sssfsss"),
    ("cf_J_Toes_Ring1_", "sssfsss"),
    ("cf_J_Toes_Pinky1_", "sssfsss"),
    ("cf_J_LegUpDam_", "c"),
    ("cf_J_LegKnee_back_", "c"),
    ("cf_J_LegKnee_dam_", "c"),

    // Torso
    ("cf_J_Spine01_s", "usSssss"),
    ("cf_J_Spine02_s", "xxxssss"),
    ("cf_J_Spine03_s", "xxxssss"),
    ("cf_J_Spine01_r_s", "xssssss"),
    ("cf_J_Spine02_r_s", "xssssss"),
    ("cf_J_Spine03_r_s", "xssssss"),

    // Arms
    ("cf_J_Shoulder_", "f"),
    ("cf_J_Shoulder02_s_", "sxxxsss"),
    ("cf_J_ArmUp00_", "sxcfscc"),
    ("cf_J_ArmUp01_s_", "SSSSsss"),
    ("cf_J_ArmUp02_s_", "sssxsss"),
    ("cf_J_ArmUp03_s_", "sssxsss"),
    ("cf_J_ArmElbo_low_s_", "xxxxsss"),
    ("cf_J_ArmElboura_s_", "xxuxsxs"),
    ("cf_J_ArmLow01_", "xxxfscc"),
    ("cf_J_ArmLow01_s_", "sssxsss"),
    ("cf_J_ArmLow02_s_", "sssxsss"),
    ("cf_J_Hand_", "f"),
    ("cf_J_Hand_s_", "xxxxsss"),
    ("cf_J_Hand_Wrist_s_", "xxxxsss"),
    ("cf_J_ArmUp01_dam_", "c"),
    ("cf_J_ArmUp02_dam_", "c"),
    ("cf_J_ArmUp03_dam_", "?"),
    ("cf_J_ArmElbo_dam_01_", "cxccxxx"),
    ("cf_J_ArmElboura_dam_", "c"),
    ("cf_J_ArmLow02_dam_", "xxxcxss"),
    ("cf_J_Hand_Wrist_dam_", "xxxcxxx"),
    ("cf_J_Hand_dam_", "c"),

    // Fingers
    ("cf_J_Hand_Index01_", "f"),
    ("cf_J_Hand_Index02_", "f"),
    ("cf_J_Hand_Index03_", "f"),
    ("cf_J_Hand_Little01_", "f"),
    ("cf_J_Hand_Little02_", "f"),
    ("cf_J_Hand_Little03_", "f"),
    ("cf_J_Hand_Middle01_", "f"),
    ("cf_J_Hand_Middle02_", "f"),
    ("cf_J_Hand_Middle03_", "f"),
    ("cf_J_Hand_Ring01_", "f"),
    ("cf_J_Hand_Ring02_", "f"),
    ("cf_J_Hand_Ring03_", "f"),
    ("cf_J_Hand_Thumb01_", "f"),
    ("cf_J_Hand_Thumb02_", "f"),
    ("cf_J_Hand_Thumb03_", "f"),

    // FK spine
    ("cf_J_Hips", "xxxfxxx"),
    ("cf_J_Kosi01", "xxxfsxs"),
    ("cf_J_Kosi02", "xxxfsxs"),
    ("cf_J_LegLow01_", "f"),
    ("cf_J_Spine01", "f"),
    ("cf_J_Spine02", "f"),
    ("cf_J_Spine03", "f"),
    ("cf_J_Mune00", "xccfxxx"),
    ("cf_J_Neck", "f"),
    ("cf_J_Head", "f"),

    // Chest
    ("cf_J_Mune00_", "iiiuxxx"),
    ("cf_J_Mune00_t_", "sssssss"),
    ("cf_J_Mune00_s_", "sssssss"),
    ("cf_J_Mune00_d_", "sxssxxx"),
    ("cf_J_Mune01_", "iiiixxx"),
    ("cf_J_Mune01_s_", "xssssss"),
    ("cf_J_Mune01_t_", "sxssxxx"),
    ("cf_J_Mune02_", "xiiixxx"),
    ("cf_J_Mune02_s_", "xisssss"),
    ("cf_J_Mune02_t_", "xxssxxx"),
    ("cf_J_Mune03_", "xiixxxx"),
    ("cf_J_Mune03_s_", "xxsxsss"),
    ("cf_J_Mune04_s_", "xxsxsss"),
    ("cf_J_Mune_Nip01_s_", "ixsxsss"),
    ("cf_J_Mune_Nip02_s_", "xxixsss"),

    // Neck and head
    ("cf_J_Neck_s", "xxxxsss"),
    ("cf_J_NeckUp_s", "xssssss"),
    ("cf_J_NeckFront_s", "xssssss"),
    ("p_cf_head_bone", "xxxxxxx"),
    ("cf_J_FaceRoot", "xxxxxxx"),
    ("cf_J_FaceRoot_s", "xssssss"),
    ("cf_J_FaceBase", "xscxsss"),
    ("cf_J_Head_s", "xssxsss"),
    ("cf_J_FaceLowBase", "xxSxxxx"),
    ("cf_J_FaceLow_s", "xxxxsss"),
    ("cf_J_FaceLow_s_s", "xssssss"),
    ("cf_J_FaceUp_ty", "xssxsss"),
    ("cf_J_FaceUp_tz", "xxsxsss"),
    ("cf_J_FaceUpFront_ty", "xssssss"),
    ("cf_J_FaceRoot_r_s", "xssssss"),

    // Face
    ("cf_J_CheekLow_", "sssssss"),
    ("cf_J_CheekUp_", "sssssss"),
    ("cf_J_CheekMid_", "sssssss"),
    ("cf_J_Chin_rs", "xssssss"),
    ("cf_J_ChinTip_s", "xssssss"),
    ("cf_J_ChinLow", "xsxxsss"),
    ("cf_J_ChinFront_s", "xssssss"),
    ("cf_J_ChinFront2_s", "xssssss"),
    ("cf_J_MouthBase_tr", "xssxsss"),
    ("cf_J_MouthBase_s", "xssssss"),
    ("cf_J_Mouth_", "fffffff"),
    ("cf_J_MouthLow", "xssxsss"),
    ("cf_J_MouthMove", "?"),
    ("cf_J_Mouthup", "xSxxsss"),
    ("cf_J_MouthCavity", "xxSxxxx"),
    ("cf_J_EarLow_", "xsxxsss"),
    ("cf_J_EarUp_", "sssisss"),
    ("cf_J_EarBase_s_", "xxsssss"),

    // Eyes
    ("cf_J_Eye_t_", "ssssxxx"),
    ("cf_J_Eye_s_", "SSSxsss"),
    ("cf_J_Eye_r_", "xxxsxxx"),
    ("cf_J_EyePos_rz_", "xxxsxxx"),
    ("cf_J_look_", "f"),
    ("cf_J_Eye01_", "xxxSxxx"),
    ("cf_J_Eye02_", "xxxSxxx"),
    ("cf_J_Eye03_", "iiiSxxx"),
    ("cf_J_Eye04_", "xxxSxxx"),
    ("cf_J_Eye01_s_", "sssssss"),
    ("cf_J_Eye02_s_", "sssssss"),
    ("cf_J_Eye03_s_", "sssssss"),
    ("cf_J_Eye04_s_", "sssssss"),

    // Nose and jaw
    ("cf_J_NoseBase_trs", "xssxxxx"),
    ("cf_J_NoseBase_s", "xxxssss"),
    ("cf_J_Nose_r", "xxxsxxx"),
    ("cf_J_Nose_t", "xssssss"),
    ("cf_J_Nose_t_s", "xssssss"),
    ("cf_J_Nose_tip", "xssssss"),
    ("cf_J_NoseWing_tx_", "sssssss"),
    ("cf_J_NoseBridge_t", "xssssss"),
    ("cf_J_NoseBridge_s", "xssssss"),
    ("cf_J_NoseCheek_s", "xssssss"),
    ("cf_J_Nostril_", "sssssss"),
    ("cf_J_Nose_Septum", "xssssss"),
    ("cf_J_Nasolabial_s", "xssssss"),
    ("cf_J_Forehead", "xxxxsss"),
    ("cf_J_UpperJaw", "sssssss"),
    ("cf_J_LowerJaw", "sssxsss"),

    // Accessory chains, fully posable
    ("balls", "fffffff"),
    ("stick_01", "fffffff"),
    ("stick_02", "fffffff"),
    ("stick_03", "fffffff"),
    ("stick_04", "fffffff"),
    ("tip_base", "fffffff"),
    ("fskin_bottom", "fffffff"),
    ("fskin_top", "fffffff"),
    ("fskin_left", "fffffff"),
    ("fskin_right", "fffffff"),
    ("sheath", "fffffff"),
];

/// Joint name prefixes whose joints are simulated by the game (skirts and
/// similar). They classify as unknown and are left out of validation.
pub static UNTRACKED_PREFIXES: &[&str] = &["cf_J_Vagina", "cf_J_Legsk"];
