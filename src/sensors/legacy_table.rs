//! Legacy 10-bit thermistor curve, tenths of a degree Celsius per ADC step.
//!
//! Index `i` is the 10-bit code read through the old 7.15 kOhm divider on a
//! 5 V rail. [`super::lut::TempLut::from_legacy`] re-maps it onto the
//! 16-bit ADS1115 front-end at boot.

pub const LEGACY_TEMP_TABLE: [u16; 921] = [
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0,
    0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 0, 10, 15, 18, 20,
    25, 30, 35, 40, 45, 48, 50, 55, 58, 60, 65, 70, 75, 78, 80, 85,
    88, 90, 95, 98, 100, 105, 108, 110, 115, 118, 120, 123, 125, 128, 130, 135,
    138, 140, 143, 145, 148, 150, 155, 158, 160, 163, 165, 168, 170, 173, 175, 178,
    180, 183, 185, 188, 190, 193, 195, 198, 200, 203, 205, 207, 209, 210, 213, 215,
    218, 220, 223, 224, 225, 228, 230, 233, 235, 237, 239, 240, 243, 245, 247, 249,
    250, 253, 255, 257, 259, 260, 263, 265, 267, 269, 270, 273, 275, 277, 279, 280,
    283, 285, 287, 289, 290, 292, 294, 295, 297, 299, 300, 303, 305, 307, 309, 310,
    312, 313, 315, 317, 319, 320, 322, 324, 325, 327, 329, 330, 332, 334, 335, 337,
    339, 340, 342, 344, 345, 347, 349, 350, 352, 354, 355, 356, 358, 359, 360, 362,
    364, 365, 367, 369, 370, 372, 374, 375, 376, 378, 379, 380, 382, 384, 385, 386,
    388, 389, 390, 392, 394, 395, 396, 398, 399, 400, 402, 404, 405, 406, 408, 409,
    410, 412, 414, 415, 416, 418, 419, 420, 422, 424, 425, 426, 428, 429, 430, 432,
    434, 435, 436, 438, 439, 440, 442, 443, 444, 445, 446, 447, 449, 450, 452, 454,
    455, 456, 458, 459, 460, 462, 463, 464, 465, 466, 468, 469, 470, 472, 474, 475,
    476, 478, 479, 480, 482, 484, 485, 486, 487, 488, 489, 490, 492, 493, 494, 495,
    496, 498, 499, 500, 502, 503, 504, 505, 506, 508, 509, 510, 512, 513, 514, 515,
    516, 518, 519, 520, 521, 523, 524, 525, 526, 528, 529, 530, 532, 533, 534, 535,
    536, 537, 538, 539, 540, 542, 543, 544, 545, 547, 548, 549, 550, 551, 553, 554,
    555, 556, 557, 559, 560, 562, 563, 564, 565, 566, 567, 568, 569, 570, 571, 573,
    574, 575, 577, 578, 579, 580, 582, 583, 584, 585, 586, 587, 588, 589, 590, 591,
    593, 594, 595, 596, 597, 598, 599, 600, 601, 602, 604, 605, 607, 608, 609, 610,
    611, 613, 614, 615, 616, 617, 618, 619, 620, 621, 622, 623, 624, 625, 626, 627,
    628, 630, 631, 632, 634, 635, 637, 638, 639, 640, 641, 642, 644, 645, 646, 647,
    648, 649, 650, 651, 652, 653, 654, 655, 657, 658, 659, 660, 662, 663, 664, 665,
    666, 667, 669, 670, 672, 673, 674, 675, 676, 677, 678, 679, 680, 681, 682, 683,
    684, 685, 686, 687, 688, 690, 691, 693, 694, 695, 696, 698, 699, 700, 701, 702,
    703, 704, 705, 706, 707, 708, 710, 712, 713, 714, 715, 716, 717, 718, 719, 720,
    722, 723, 724, 725, 726, 727, 728, 730, 732, 733, 734, 735, 736, 737, 738, 739,
    740, 741, 743, 744, 745, 746, 747, 748, 749, 750, 751, 752, 753, 755, 757, 758,
    759, 760, 762, 763, 764, 765, 767, 768, 769, 770, 771, 772, 773, 774, 775, 776,
    777, 778, 780, 781, 782, 783, 785, 786, 787, 789, 790, 791, 792, 793, 795, 796,
    797, 799, 800, 801, 802, 804, 805, 806, 807, 808, 809, 810, 812, 813, 814, 815,
    816, 817, 818, 820, 821, 822, 824, 825, 826, 827, 829, 830, 832, 833, 834, 835,
    836, 838, 839, 840, 841, 843, 844, 845, 847, 848, 849, 850, 852, 853, 854, 855,
    857, 858, 859, 860, 861, 862, 864, 865, 866, 868, 869, 870, 871, 873, 874, 875,
    876, 877, 878, 880, 882, 884, 885, 886, 887, 889, 890, 891, 893, 894, 895, 897,
    898, 899, 900, 901, 903, 905, 906, 908, 909, 910, 912, 914, 915, 916, 917, 918,
    919, 920, 922, 923, 924, 925, 927, 928, 930, 932, 933, 935, 936, 937, 939, 940,
    941, 943, 944, 945, 947, 948, 949, 950, 952, 953, 955, 956, 957, 959, 960, 962,
    964, 965, 966, 968, 970, 972, 974, 975, 977, 978, 979, 980, 982, 983, 985, 986,
    987, 989, 990, 991, 993, 995, 997, 998, 1000, 1002, 1003, 1005, 1006, 1008, 1009, 1010,
    1013, 1015, 1017, 1019, 1020, 1022, 1024, 1025, 1027, 1028, 1029, 1030, 1031, 1033, 1035, 1036,
    1038, 1040, 1042, 1043, 1044, 1045, 1047, 1048, 1050, 1052, 1054, 1055, 1056, 1058, 1060, 1063,
    1065, 1067, 1069, 1070, 1071, 1073, 1075, 1076, 1078, 1080, 1082, 1084, 1085, 1086, 1088, 1090,
    1091, 1093, 1095, 1097, 1099, 1100, 1103, 1105, 1107, 1109, 1110, 1112, 1113, 1115, 1116, 1118,
    1120, 1123, 1125, 1126, 1128, 1130, 1133, 1135, 1137, 1138, 1140, 1143, 1145, 1147, 1149, 1150,
    1151, 1153, 1155, 1157, 1160, 1163, 1165, 1167, 1169, 1170, 1172, 1174, 1175, 1177, 1180, 1182,
    1185, 1188, 1190, 1192, 1194, 1195, 1197, 1200, 1203, 1205, 1207, 1209, 1210, 1213, 1215, 1217,
    1220, 1223, 1225, 1228, 1230, 1233, 1235, 1237, 1240, 1243, 1245, 1248, 1250, 1252, 1255, 1257,
    1259, 1260, 1263, 1265, 1267, 1270, 1275, 1278, 1280, 1283, 1285, 1288, 1290, 1293, 1295, 1297,
    1300, 1303, 1305, 1308, 1310, 1313, 1315, 1320, 1322, 1325, 1328, 1330, 1335, 1337, 1340, 1343,
    1345, 1348, 1350, 1353, 1355, 1360, 1365, 1368, 1370, 1373, 1375, 1378, 1380, 1385, 1387, 1390,
    1393, 1395, 1400, 1402, 1405, 1410, 1413, 1417, 1420, 1425, 1430, 1433, 1437, 1440, 1443, 1447,
    1450, 1455, 1460, 1463, 1467, 1470, 1475, 1480, 1483, 1487, 1490, 1495, 1500, 1503, 1507, 1510,
    1515, 1520, 1523, 1527, 1530, 1535, 1540, 1545, 1550,
];
